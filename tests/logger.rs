use color_eyre::{eyre::eyre, Result};
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serial_mux::{events::Event, logger, routing::RoutingPolicy};
use tokio::{net::TcpStream, time::timeout};

mod common;

#[tokio::test(flavor = "multi_thread")]
async fn logger_sees_broadcast_lines() -> Result<()> {
    let mut server = common::start(RoutingPolicy::Broadcast).await?;

    let stream = TcpStream::connect(server.addr).await?;
    server
        .wait_for(|event| matches!(event, Event::Connected { .. }).then_some(()))
        .await?;

    server.write_device(b"booting\r\nREADY\n").await?;

    let mut output = logger::tagged_output(stream);
    let mut logged = String::new();
    while logged.matches('\n').count() < 2 {
        let chunk = timeout(common::PATIENCE, output.next())
            .await?
            .ok_or_else(|| eyre!("Server went away"))??;
        logged.push_str(&String::from_utf8(chunk)?);
    }

    let lines = logged
        .lines()
        .map(|line| {
            let (stamp, line) = line.split_once("] ").expect("Stamp should end the tag");
            assert!(stamp.starts_with('['));
            line.to_owned()
        })
        .collect::<Vec<_>>();

    assert_eq!(lines, vec!["booting", "READY"]);

    Ok(())
}
