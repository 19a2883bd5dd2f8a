use std::{
    net::TcpListener as StdTcpListener,
    sync::{Arc, Mutex},
    time::{Duration as StdDuration, Instant as StdInstant},
};

use meshwire_timing::Duration;
use meshwire_wire::Command;
use mio::net::TcpStream;

use meshwire_net::Socket;

fn connected_pair() -> (TcpStream, TcpStream) {
    let listener = StdTcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let client = std::net::TcpStream::connect(addr).expect("connect");
    let (server, _) = listener.accept().expect("accept");
    server.set_nonblocking(true).expect("nonblocking");
    client.set_nonblocking(true).expect("nonblocking");
    (TcpStream::from_std(server), TcpStream::from_std(client))
}

fn spin_until(mut cond: impl FnMut() -> bool, timeout: StdDuration) -> bool {
    let start = StdInstant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        std::thread::sleep(StdDuration::from_millis(1));
    }
    false
}

fn authorized_pair() -> (Socket, Socket) {
    authorized_pair_with_cache(1 << 20)
}

fn authorized_pair_with_cache(max_payload_size: usize) -> (Socket, Socket) {
    let (server_stream, client_stream) = connected_pair();
    let server = Socket::accepted(server_stream, max_payload_size, Duration::from_secs(5));
    let client = Socket::connected(client_stream, max_payload_size, Duration::from_secs(5));
    assert!(
        spin_until(
            || {
                let _ = server.authorize();
                let _ = client.authorize();
                server.is_authorized() && client.is_authorized()
            },
            StdDuration::from_secs(2),
        ),
        "handshake never completed"
    );
    (server, client)
}

/// Registers a `pre_command` hook on `socket` that decodes and appends every
/// observed command, in arrival order, to the returned collector.
fn collect_pre_command(socket: &Socket) -> Arc<Mutex<Vec<Command>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    socket.hooks().register_hook("pre_command", move |_, data| {
        if let Ok(cmd) = Command::decode(data) {
            sink.lock().unwrap().push(cmd);
        }
    });
    seen
}

#[test]
fn many_commands_survive_fragmentation_and_reassembly() {
    let (server, client) = authorized_pair();
    let seen = collect_pre_command(&server);

    let messages: Vec<String> = (0..500).map(|i| format!("message-{i}")).collect();
    for m in &messages {
        client.send_command(Command::string(m.clone()));
    }

    spin_until(
        || {
            client.runtime_update();
            server.runtime_update();
            seen.lock().unwrap().len() == messages.len()
        },
        StdDuration::from_secs(5),
    );

    let received: Vec<String> = seen
        .lock()
        .unwrap()
        .iter()
        .map(|cmd| cmd.as_str().expect("utf8").to_owned())
        .collect();
    assert_eq!(received, messages);
}

#[test]
fn keepalive_frames_do_not_surface_as_commands() {
    let (server, client) = authorized_pair();
    let seen = collect_pre_command(&server);

    client.send_keepalive();
    client.send_command(Command::string("after-keepalive"));

    spin_until(
        || {
            client.runtime_update();
            server.runtime_update();
            !seen.lock().unwrap().is_empty()
        },
        StdDuration::from_secs(2),
    );

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].as_str(), Some("after-keepalive"));
}

#[test]
fn wait_for_flush_observes_outbound_queue_draining() {
    let (server, client) = authorized_pair();
    let seen = collect_pre_command(&server);
    client.send_command(Command::string("flush-me"));

    let pump = std::thread::spawn(move || {
        for _ in 0..200 {
            client.runtime_update();
            std::thread::sleep(StdDuration::from_millis(5));
        }
        client
    });

    let client = pump.join().expect("pump thread panicked");
    assert!(client.wait_for_flush(Duration::from_secs(2)));

    spin_until(
        || {
            server.runtime_update();
            !seen.lock().unwrap().is_empty()
        },
        StdDuration::from_secs(2),
    );
}

#[test]
fn ping_earns_an_automatic_response() {
    let (server, client) = authorized_pair();
    let client_seen = collect_pre_command(&client);
    let server_seen = collect_pre_command(&server);

    server.send_command(Command::ping());

    spin_until(
        || {
            server.runtime_update();
            client.runtime_update();
            server.runtime_update();
            server_seen
                .lock()
                .unwrap()
                .iter()
                .any(|c| c.kind == meshwire_wire::CommandKind::Response)
        },
        StdDuration::from_secs(2),
    );

    assert!(client_seen.lock().unwrap().iter().any(|c| c.kind == meshwire_wire::CommandKind::Ping));
    assert!(
        server_seen.lock().unwrap().iter().any(|c| c.kind == meshwire_wire::CommandKind::Response),
        "server should observe the client's automatic RESPONSE to its PING"
    );
}

/// A payload far larger than the reassembly chunk cache must still arrive
/// byte-identical: `max_payload_size` bounds a single read, not the total
/// frame size, so the reader has to walk the frame across many chunks.
#[test]
fn large_payload_survives_reassembly_under_a_small_chunk_cache() {
    let (server, client) = authorized_pair_with_cache(256);
    let seen = collect_pre_command(&server);

    let payload = vec![b'x'; 100_000];
    client.send_command(Command::new(meshwire_wire::CommandKind::String, payload.clone()));

    spin_until(
        || {
            client.runtime_update();
            server.runtime_update();
            !seen.lock().unwrap().is_empty()
        },
        StdDuration::from_secs(5),
    );

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].data, payload);
}

/// Boundary case: a frame exactly as big as the chunk cache arrives in one
/// chunk.
#[test]
fn frame_exactly_the_chunk_cache_size_round_trips() {
    let (server, client) = authorized_pair_with_cache(256);
    let seen = collect_pre_command(&server);

    let payload = vec![b'y'; 256];
    client.send_command(Command::new(meshwire_wire::CommandKind::String, payload.clone()));

    spin_until(
        || {
            client.runtime_update();
            server.runtime_update();
            !seen.lock().unwrap().is_empty()
        },
        StdDuration::from_secs(2),
    );

    assert_eq!(seen.lock().unwrap()[0].data, payload);
}

/// Boundary case: one byte over the chunk cache size forces the two-chunk
/// path and still round-trips byte-identical.
#[test]
fn frame_one_byte_over_the_chunk_cache_size_round_trips() {
    let (server, client) = authorized_pair_with_cache(256);
    let seen = collect_pre_command(&server);

    let payload = vec![b'z'; 257];
    client.send_command(Command::new(meshwire_wire::CommandKind::String, payload.clone()));

    spin_until(
        || {
            client.runtime_update();
            server.runtime_update();
            !seen.lock().unwrap().is_empty()
        },
        StdDuration::from_secs(2),
    );

    assert_eq!(seen.lock().unwrap()[0].data, payload);
}
