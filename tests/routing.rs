use std::time::Duration;

use color_eyre::Result;
use pretty_assertions::assert_eq;
use serial_mux::{events::Event, routing::RoutingPolicy};

mod common;

#[tokio::test(flavor = "multi_thread")]
async fn unicast_reply_goes_to_writer() -> Result<()> {
    let mut server = common::start(RoutingPolicy::Focused).await?;
    let (mut client, id) = server.connect().await?;

    client.write("AT\r\n").await?;
    assert_eq!(server.read_device(4).await?, b"AT\r\n");

    let focused = server
        .wait_for(|event| match event {
            Event::Focused(id) => Some(*id),
            _ => None,
        })
        .await?;
    assert_eq!(focused, id);

    server.write_device(b"OK\r\n").await?;
    assert_eq!(client.read_until("\r\n").await?, b"OK\r\n");

    assert!(server.stop().await?.is_ok());

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn broadcast_reaches_everyone() -> Result<()> {
    let mut server = common::start(RoutingPolicy::Broadcast).await?;
    let (mut first, _) = server.connect().await?;
    let (mut second, _) = server.connect().await?;

    server.write_device(b"READY\n").await?;

    assert_eq!(first.read_until("\n").await?, b"READY\n");
    assert_eq!(second.read_until("\n").await?, b"READY\n");

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn focus_follows_the_latest_writer() -> Result<()> {
    let mut server = common::start(RoutingPolicy::Focused).await?;
    let (mut a, a_id) = server.connect().await?;
    let (mut b, b_id) = server.connect().await?;

    a.write("x").await?;
    assert_eq!(server.read_device(1).await?, b"x");
    b.write("y").await?;
    assert_eq!(server.read_device(1).await?, b"y");

    let mut focus_changes = vec![];
    while focus_changes.last() != Some(&b_id) {
        if let Event::Focused(id) = server.next_event().await? {
            focus_changes.push(id);
        }
    }
    assert_eq!(focus_changes, vec![a_id, b_id]);

    server.write_device(b"OK\n").await?;
    assert_eq!(b.read_until("\n").await?, b"OK\n");

    let nothing = tokio::time::timeout(Duration::from_millis(300), a.read_until("\n")).await;
    assert!(nothing.is_err(), "A should not hear the reply");

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn nobody_focused_means_output_is_dropped() -> Result<()> {
    let mut server = common::start(RoutingPolicy::Focused).await?;
    let (mut idle, _) = server.connect().await?;

    server.write_device(b"boot banner\n").await?;

    let nothing = tokio::time::timeout(Duration::from_millis(300), idle.read_until("\n")).await;
    assert!(nothing.is_err());

    // Output is not kept around for whoever writes next.
    idle.write("\r\n").await?;
    server.read_device(2).await?;
    server.write_device(b"prompt\n").await?;
    assert_eq!(idle.read_until("\n").await?, b"prompt\n");

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn command_and_prompt() -> Result<()> {
    let mut server = common::start(RoutingPolicy::Focused).await?;
    let (mut client, _) = server.connect().await?;

    client.write("pwd\r\n").await?;
    assert_eq!(server.read_device(5).await?, b"pwd\r\n");

    server.write_device(b"/home/user\r\n[user@host ~]").await?;
    server.write_device(b"$ ").await?;

    assert_eq!(
        client.read_until("]$").await?,
        b"/home/user\r\n[user@host ~]$"
    );

    Ok(())
}
