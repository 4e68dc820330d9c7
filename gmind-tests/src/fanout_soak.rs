//! Soak harness for the session registry: concurrent subscribe /
//! publish / disconnect traffic against one registry, checking that
//! fan-out only ever reaches currently-subscribed clients and that
//! per-client failures never stall a round

use chrono::Local;
use gmind_model::GreenhouseSnapshot;
use gmind_registry::GreenhouseSessions;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::Duration;

const CLIENTS: usize = 10;
const ROUNDS: usize = 20;

fn snapshot(greenhouse: &str, round: usize) -> GreenhouseSnapshot {
    GreenhouseSnapshot::new(
        greenhouse.to_string(),
        format!("round {round}"),
        Local::now().naive_local(),
    )
}

#[actix::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let sessions = GreenhouseSessions::start(Duration::from_secs(2));
    let received = Arc::new(AtomicUsize::new(0));

    log::info!("connecting {CLIENTS} clients");
    for i in 0..CLIENTS {
        let client = format!("client-{i}");
        let mut rx = sessions.connect(client.clone()).await?;

        // even clients watch g-even, odd clients watch g-odd
        let greenhouse = if i % 2 == 0 { "g-even" } else { "g-odd" };
        sessions
            .set_subscriptions(&client, vec![greenhouse.to_string()])
            .await?;

        let received = received.clone();
        tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                log::debug!("{client} got {} ({})", update.greenhouse, update.name);
                received.fetch_add(1, Ordering::Relaxed);
            }
            log::debug!("{client} mailbox closed");
        });
    }

    let publisher = sessions.publisher();
    let mut expected = 0;

    for round in 0..ROUNDS {
        // halfway through, disconnect the odd clients mid-traffic
        if round == ROUNDS / 2 {
            log::info!("disconnecting odd clients");
            for i in (1..CLIENTS).step_by(2) {
                sessions.disconnect(format!("client-{i}")).await?;
            }
        }

        let even = publisher.publish(&"g-even".to_string(), snapshot("g-even", round)).await;
        let odd = publisher.publish(&"g-odd".to_string(), snapshot("g-odd", round)).await;
        log::info!(
            "round {round}: even {}/{} delivered, odd {}/{}",
            even.delivered(),
            even.attempted,
            odd.delivered(),
            odd.attempted
        );
        expected += even.delivered() + odd.delivered();

        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // let the drain tasks catch up before comparing
    tokio::time::sleep(Duration::from_millis(200)).await;
    let got = received.load(Ordering::Relaxed);
    log::info!("soak complete: {got} updates received, {expected} deliveries reported");

    if got != expected {
        return Err(format!("received {got} but reported {expected}").into());
    }

    // odd clients are gone, so only g-even still has subscribers
    let even_subs = sessions.subscribers_of(&"g-even".to_string()).await?;
    let odd_subs = sessions.subscribers_of(&"g-odd".to_string()).await?;
    log::info!("remaining subscribers: even {even_subs:?}, odd {odd_subs:?}");
    if !odd_subs.is_empty() {
        return Err("odd greenhouse kept subscribers past disconnect".into());
    }

    Ok(())
}
