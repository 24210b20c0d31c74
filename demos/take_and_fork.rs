//! Waiting for Events and Running Child Tasks
//!
//! A checkout flow: when an order is placed, the listener forks a payment
//! task, then waits for either a `Confirmed` or a `Cancelled` action. A
//! cancellation aborts the payment child before it finishes.
use evtask::{
    Action, Drain, ForkApi, ForkOptions, ListenerApi, ListenerMiddleware, Listener, ReducerStore,
    Trigger, from_fn,
};
use std::time::Duration;

#[derive(Debug, Clone)]
enum OrderAction {
    Placed(u32),
    Confirmed(u32),
    Cancelled(u32),
}

impl Action for OrderAction {
    fn kind(&self) -> &str {
        match self {
            OrderAction::Placed(_) => "placed",
            OrderAction::Confirmed(_) => "confirmed",
            OrderAction::Cancelled(_) => "cancelled",
        }
    }
}

type OrderStore = ReducerStore<Vec<OrderAction>, OrderAction>;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    // 1. A store that just records history
    let store = OrderStore::new(Vec::new(), |history, action| {
        let mut history = history.clone();
        history.push(action.clone());
        history
    });
    let middleware = ListenerMiddleware::new(store);

    // 2. On every placed order, fork a payment and wait for the outcome
    middleware.start_listening(Listener::new(
        Trigger::kind("placed"),
        from_fn(|action, api: ListenerApi<OrderStore>| async move {
            let OrderAction::Placed(order) = *action else {
                return Ok(());
            };

            let payment = api.fork(
                move |fork: ForkApi| async move {
                    fork.delay(Duration::from_millis(200)).await?;
                    println!("[Payment] charged order {order}");
                    anyhow::Ok(order)
                },
                ForkOptions::default(),
            );

            let outcome = api
                .take(
                    move |action, _, _| {
                        matches!(action,
                            OrderAction::Confirmed(id) | OrderAction::Cancelled(id) if *id == order)
                    },
                    Some(Duration::from_secs(1)),
                )
                .await?;

            match outcome {
                Some((action, _, _)) if matches!(*action, OrderAction::Cancelled(_)) => {
                    payment.cancel();
                    println!("[Order {order}] cancelled: {:?}", payment.await.cancel_reason());
                }
                Some(_) => println!("[Order {order}] confirmed: {:?}", payment.await.into_result()?),
                None => println!("[Order {order}] timed out"),
            }
            anyhow::Ok(())
        }),
    ));

    // 3. One order is confirmed, the other cancelled before payment completes
    middleware.dispatch(OrderAction::Placed(1));
    middleware.dispatch(OrderAction::Placed(2));
    tokio::time::sleep(Duration::from_millis(50)).await;
    middleware.dispatch(OrderAction::Confirmed(1));
    middleware.dispatch(OrderAction::Cancelled(2));

    // 4. Wait for every invocation to settle
    middleware.drain().await;
    println!("All orders settled.");
}
