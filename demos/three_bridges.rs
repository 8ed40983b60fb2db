//! Three Bridges Example
//!
//! This example simulates the smallest interesting bridged network:
//! bridges 1 - 2 - 3 with bridge 2 as spanning-tree root.
//!
//! It showcases:
//! - Building a topology in code
//! - Watching the live observation stream while the run progresses
//! - Fault injection by marking a bridge as failed
//! - Printing and exporting the run report
//!
//! Run with: `cargo run --example three_bridges`

use std::time::Duration;

use bridgesim::{Node, Port, SimConfigBuilder, SimEvent, SimulationSession, Topology};

// ============================================================================
// Topology
// ============================================================================

const ROOT: i64 = 2;

fn three_bridges() -> Topology {
    Topology::new()
        .with_node(
            Node::new(1)
                .at(100.0, 100.0)
                .with_tree(ROOT, 1, ROOT)
                .with_port(Port::forwarding(1, ROOT)),
        )
        .with_node(
            Node::new(ROOT)
                .at(200.0, 100.0)
                .with_port(Port::forwarding(1, 1))
                .with_port(Port::forwarding(2, 3)),
        )
        .with_node(
            Node::new(3)
                .at(300.0, 100.0)
                .with_tree(ROOT, 1, ROOT)
                .with_port(Port::forwarding(1, ROOT)),
        )
        .with_link(1, ROOT)
        .with_link(ROOT, 3)
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    bridgesim::init_logging("info");

    // Healthy network, observed live.
    let config = SimConfigBuilder::new()
        .processing_delay(Duration::from_millis(100))
        .build()?;
    let mut session = SimulationSession::new(config);
    let mut events = session.observe();

    let watcher = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event.event {
                SimEvent::PacketDelivered { node, packet } => {
                    println!("  bridge {} <- packet from {}", node, packet.source_id);
                }
                SimEvent::ForwardFailed { from, to, failure } => {
                    println!("  bridge {} -> {} dropped: {}", from, to, failure);
                }
                _ => {}
            }
        }
    });

    println!("=== Healthy network ===");
    let report = session.run(three_bridges()).await?;
    drop(session);
    watcher.await?;
    println!();
    println!("{}", report.summary());

    // Same network with bridge 3 down.
    let config = SimConfigBuilder::new()
        .processing_delay(Duration::from_millis(10))
        .fail_node(3)
        .build()?;

    println!("=== Bridge 3 failed ===");
    let report = SimulationSession::new(config).run(three_bridges()).await?;
    println!("{}", report.summary());
    print!("{}", report.to_csv());

    Ok(())
}
