//! Messages arriving over real TCP connections, chopped up in various ways.
mod utils;

use std::time::Duration;

use anyhow::Result;
use pretty_assertions::assert_eq;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::sleep;

use utils::*;

/// Write `chunks` as separate writes with a pause between them, so that the server sees them as separate reads.
async fn write_slowly(stream: &mut TcpStream, data: &[u8], sizes: &[usize]) -> Result<()> {
    let mut start = 0;
    for s in sizes {
        stream.write_all(&data[start..start + s]).await?;
        stream.flush().await?;
        start += s;
        sleep(Duration::from_millis(20)).await;
    }
    stream.write_all(&data[start..]).await?;
    Ok(())
}

async fn hello_in_pieces_impl() -> Result<()> {
    let (addr, mut accepted) = start_acceptor(test_config().build()?, |_| {}).await?;
    let mut client = TcpStream::connect(addr).await?;
    let mut server = next_accepted(&mut accepted).await?;

    let data = frame(1, b"hello");
    assert_eq!(data.len(), 10);
    write_slowly(&mut client, &data, &[2, 4, 4]).await?;

    assert_eq!(
        server.events.next().await?,
        Event::Message {
            header: vec![1, 0, 0, 0, 5],
            body: b"hello".to_vec()
        }
    );

    drop(client);
    assert_eq!(server.events.rest().await?, vec![Event::StreamEnd]);
    server.conn.finished().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hello_in_pieces() {
    run_test(hello_in_pieces_impl()).await;
}

async fn back_to_back_impl() -> Result<()> {
    let (addr, mut accepted) = start_acceptor(test_config().build()?, |_| {}).await?;
    let mut client = TcpStream::connect(addr).await?;
    let mut server = next_accepted(&mut accepted).await?;

    let mut data = frame(1, b"first");
    data.extend(frame(2, b"second"));
    client.write_all(&data).await?;

    assert_eq!(server.events.next().await?, Event::message(1, b"first"));
    assert_eq!(server.events.next().await?, Event::message(2, b"second"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn back_to_back() {
    run_test(back_to_back_impl()).await;
}

async fn empty_body_impl() -> Result<()> {
    let (addr, mut accepted) = start_acceptor(test_config().build()?, |_| {}).await?;
    let mut client = TcpStream::connect(addr).await?;
    let mut server = next_accepted(&mut accepted).await?;

    // Nothing follows the header, so the message must be delivered without waiting for more bytes.
    client.write_all(&frame(3, b"")).await?;
    assert_eq!(server.events.next().await?, Event::message(3, b""));

    client.write_all(&frame(4, b"after")).await?;
    assert_eq!(server.events.next().await?, Event::message(4, b"after"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_body() {
    run_test(empty_body_impl()).await;
}

async fn many_messages_many_ways_impl() -> Result<()> {
    // A small read buffer makes every message span several reads.
    let config = test_config().read_buffer_size(7).build()?;
    let (addr, mut accepted) = start_acceptor(config, |_| {}).await?;
    let mut client = TcpStream::connect(addr).await?;
    let mut server = next_accepted(&mut accepted).await?;

    let bodies: Vec<Vec<u8>> = (0..20u8)
        .map(|i| (0..(i as usize * 13)).map(|j| (j as u8) ^ i).collect())
        .collect();
    let mut data = vec![];
    for (i, b) in bodies.iter().enumerate() {
        data.extend(frame(i as u8, b));
    }

    write_slowly(&mut client, &data, &[1, 3, 17, 100, 2, 250]).await?;

    for (i, b) in bodies.iter().enumerate() {
        assert_eq!(server.events.next().await?, Event::message(i as u8, b));
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn many_messages_many_ways() {
    run_test(many_messages_many_ways_impl()).await;
}

async fn large_body_impl() -> Result<()> {
    let (addr, mut accepted) = start_acceptor(test_config().build()?, |_| {}).await?;
    let mut client = TcpStream::connect(addr).await?;
    let mut server = next_accepted(&mut accepted).await?;

    let body: Vec<u8> = (0..100_000u32).map(|i| i as u8).collect();
    client.write_all(&frame(9, &body)).await?;
    assert_eq!(server.events.next().await?, Event::message(9, &body));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn large_body() {
    run_test(large_body_impl()).await;
}

async fn body_over_limit_impl() -> Result<()> {
    let config = test_config().max_body_len(8).build()?;
    let (addr, mut accepted) = start_acceptor(config, |_| {}).await?;
    let mut client = TcpStream::connect(addr).await?;
    let mut server = next_accepted(&mut accepted).await?;

    client.write_all(&frame(1, b"short")).await?;
    assert_eq!(server.events.next().await?, Event::message(1, b"short"));

    client.write_all(&frame(1, b"much too long")).await?;

    // The connection gives up without delivering anything, and the client sees it go away.
    assert_eq!(server.events.rest().await?, Vec::<Event>::new());
    assert!(server.conn.is_closing());
    expect_closed(&mut client).await?;
    server.conn.finished().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn body_over_limit() {
    run_test(body_over_limit_impl()).await;
}
