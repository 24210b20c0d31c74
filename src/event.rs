/// An event flowing through the listener middleware.
///
/// `kind` is the type tag matched by [`Trigger::kind`](crate::Trigger::kind).
pub trait Action: Send + Sync + 'static {
    fn kind(&self) -> &str;
}
