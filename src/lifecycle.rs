#[trait_variant::make(Send)]
pub trait Drain {
    /// Waits until every in-flight task has settled.
    async fn drain(self);
}

#[trait_variant::make(Send)]
pub trait Close {
    /// Cancels in-flight tasks and drops registrations, then drains.
    async fn close(self);
}
