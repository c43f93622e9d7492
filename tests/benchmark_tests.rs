//! Performance benchmarks for critical game systems

use peer::{GameService, GameState, InputHandle, Role};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::codec::{decode, encode};
use shared::{ByteBufferPool, Message, PeerAddress, Shape, ShapeType, Wall, COLS, ROWS};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

fn full_wall() -> Wall {
    let mut wall = Wall::new();
    for row in ROWS / 2..ROWS {
        for col in 0..COLS {
            wall.set_cell(col, row, ShapeType::Z.id());
        }
    }
    wall
}

/// Benchmarks encoding and decoding of the largest message, a full wall
#[test]
fn benchmark_wall_frame_codec() {
    let message = Message::wall(PeerAddress::from("127.0.0.1:7000"), full_wall().snapshot());

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let frame = encode(&message).unwrap();
        let decoded = decode(&frame).unwrap();
        assert_eq!(decoded.origin, message.origin);
    }

    let duration = start.elapsed();
    println!(
        "Wall frame codec: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks encoding of the small messages sent on every move
#[test]
fn benchmark_shape_frame_encoding() {
    let shape = Shape::new(ShapeType::T, 4, 7).snapshot();
    let origin = PeerAddress::from("127.0.0.1:7001");

    let iterations = 100_000;
    let start = Instant::now();
    let mut bytes = 0;

    for _ in 0..iterations {
        bytes += encode(&Message::shape(origin.clone(), shape.clone())).unwrap().len();
    }

    let duration = start.elapsed();
    println!(
        "Shape encoding: {} frames, {} bytes in {:?} ({:.2} ns/frame)",
        iterations,
        bytes,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 1000);
}

/// Benchmarks buffer reuse against fresh allocations
#[test]
fn benchmark_buffer_pool() {
    let pool = ByteBufferPool::new();
    let sizes = [64, 240, 1024, 4096];

    let iterations = 100_000;
    let start = Instant::now();

    for i in 0..iterations {
        let buffer = pool.get(sizes[i % sizes.len()]);
        pool.recycle(buffer);
    }

    let duration = start.elapsed();
    println!(
        "Buffer pool: {} get/recycle pairs in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert_eq!(pool.leased_bytes(), 0);
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks clearing the bottom half of the wall
#[test]
fn benchmark_row_clearing() {
    let template = full_wall();

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let mut wall = template.clone();
        assert_eq!(wall.check_rows(), ROWS / 2);
    }

    let duration = start.elapsed();
    println!(
        "Row clearing: {} walls in {:?} ({:.2} μs/wall)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 1000);
}

/// Benchmarks the host simulation with several client shapes in play
#[test]
fn benchmark_host_ticks() {
    let (_inbox_tx, inbox_rx) = mpsc::unbounded_channel();
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let mut game = GameState::new(
        PeerAddress::from("host"),
        Role::Host,
        0,
        4,
        StdRng::seed_from_u64(1),
        InputHandle::default(),
        inbox_rx,
        events_tx,
    );
    for (i, id) in ["a", "b", "c"].iter().enumerate() {
        let shape = Shape::new(ShapeType::O, 3 * i as i32 + 2, 0).snapshot();
        game.handle_message(Message::shape(PeerAddress::from(*id), shape));
    }

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        if game.is_game_over() {
            break;
        }
        game.tick();
    }

    let duration = start.elapsed();
    println!(
        "Host ticks: {} ticks in {:?} ({:.2} μs/tick)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks concurrent access to the shared game handle
#[tokio::test]
async fn benchmark_service_ticks() {
    let (ui_tx, _ui_rx) = mpsc::unbounded_channel();
    let (service, _events) = GameService::new(PeerAddress::from("solo"), 40, Some(2), ui_tx);
    service.init_new_game(false, 0, 1).await;

    let iterations = 5_000;
    let start = Instant::now();

    let mut workers = Vec::new();
    for _ in 0..4 {
        let service = Arc::clone(&service);
        workers.push(tokio::spawn(async move {
            for _ in 0..iterations / 4 {
                service.tick().await;
                let _ = service.points().await;
            }
        }));
    }
    for worker in workers {
        worker.await.unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Service ticks: {} ticks across 4 tasks in {:?}",
        iterations, duration
    );

    assert!(duration.as_millis() < 2000);
}
