use std::sync::Arc;

use tokio_pubsub::{BasicEvent, Event, EventBus, EventBusConfig, Result};

#[derive(Debug, Clone)]
struct UserCreated {
    email: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("Testing tokio-pubsub...\n");

    let bus = EventBus::builder()
        .config(EventBusConfig::test())
        .build_and_start()?;

    let users = bus.listen_fn("users.*", |event: Arc<dyn Event>| async move {
        if let Some(user) = event.payload_as::<UserCreated>() {
            println!("📨 {}: {}", event.topic(), user.email);
        }
        Ok(())
    })?;

    let audit = bus.listen_fn("*", |event: Arc<dyn Event>| async move {
        println!("📝 audit: {}", event.topic());
        Ok(())
    })?;

    println!("Emitting events...");
    for email in ["ada@example.com", "grace@example.com"] {
        let event = BasicEvent::new("users.created").with_payload(UserCreated {
            email: email.to_string(),
        });
        let report = bus.emit_and_wait(event).await?;
        println!("   delivered to {} listener(s)", report.invoked);
    }

    users.destroy();
    let report = bus.emit_and_wait(BasicEvent::new("users.deleted")).await?;
    println!("   after destroy: delivered to {} listener(s)", report.invoked);

    audit.destroy();
    bus.shutdown().await?;

    println!("\n✅ Demo completed, stats: {:?}", bus.stats().dispatcher);
    Ok(())
}
