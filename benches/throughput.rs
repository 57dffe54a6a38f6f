use redis::Commands;
use relis::command::Dispatcher;
use relis::config::Config;
use relis::store::Store;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

fn get_client(port: u16) -> redis::Connection {
    let client = redis::Client::open(format!("redis://127.0.0.1:{port}/")).unwrap();
    for i in 0..50 {
        match client.get_connection() {
            Ok(conn) => return conn,
            Err(_) if i < 49 => std::thread::sleep(Duration::from_millis(100)),
            Err(e) => panic!("Failed to connect: {e}"),
        }
    }
    unreachable!()
}

fn ops_per_sec(iterations: usize, start: Instant) -> f64 {
    iterations as f64 / start.elapsed().as_secs_f64()
}

fn bench_set_get(conn: &mut redis::Connection, iterations: usize) -> (f64, f64) {
    let start = Instant::now();
    for i in 0..iterations {
        let _: () = conn
            .set(format!("bench_key_{i}"), format!("value_{i}"))
            .unwrap();
    }
    let set_ops = ops_per_sec(iterations, start);

    let start = Instant::now();
    for i in 0..iterations {
        let _: String = conn.get(format!("bench_key_{i}")).unwrap();
    }
    (set_ops, ops_per_sec(iterations, start))
}

fn bench_incr(conn: &mut redis::Connection, iterations: usize) -> f64 {
    let start = Instant::now();
    for _ in 0..iterations {
        let _: i64 = redis::cmd("INCR").arg("bench_counter").query(conn).unwrap();
    }
    ops_per_sec(iterations, start)
}

fn bench_msetnx(conn: &mut redis::Connection, iterations: usize) -> f64 {
    let start = Instant::now();
    for i in 0..iterations {
        let _: i64 = redis::cmd("MSETNX")
            .arg(format!("nx_a_{i}"))
            .arg("1")
            .arg(format!("nx_b_{i}"))
            .arg("2")
            .query(conn)
            .unwrap();
    }
    ops_per_sec(iterations, start)
}

fn bench_pipeline(conn: &mut redis::Connection, iterations: usize) -> f64 {
    let start = Instant::now();
    let batch_size = 100;
    for batch in 0..(iterations / batch_size) {
        let mut pipe = redis::pipe();
        for i in 0..batch_size {
            pipe.set(format!("pipe_key_{batch}_{i}"), "value").ignore();
        }
        let _: () = pipe.query(conn).unwrap();
    }
    ops_per_sec(iterations, start)
}

/// Dispatcher throughput without the network in between.
fn bench_dispatch(store: Store, iterations: usize) -> f64 {
    let dispatcher = Dispatcher::new(store);
    let start = Instant::now();
    for i in 0..iterations {
        let key = format!("direct_{i}").into_bytes();
        dispatcher.dispatch(vec![b"SET".to_vec(), key.clone(), b"v".to_vec()]);
        dispatcher.dispatch(vec![b"GET".to_vec(), key]);
    }
    ops_per_sec(iterations * 2, start)
}

#[tokio::main]
async fn main() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bench.db");
    let store = Store::open(path.to_str().unwrap()).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let shutdown = CancellationToken::new();
    tokio::spawn(relis::server::serve(
        listener,
        store.clone(),
        Config::default(),
        shutdown.clone(),
    ));

    tokio::task::spawn_blocking(move || {
        let mut conn = get_client(port);
        let iterations = 10_000;

        println!("=== Relis Benchmark ({iterations} operations) ===\n");

        let (set_ops, get_ops) = bench_set_get(&mut conn, iterations);
        println!("SET:      {set_ops:>10.0} ops/sec");
        println!("GET:      {get_ops:>10.0} ops/sec");

        let incr_ops = bench_incr(&mut conn, iterations);
        println!("INCR:     {incr_ops:>10.0} ops/sec");

        let msetnx_ops = bench_msetnx(&mut conn, iterations);
        println!("MSETNX:   {msetnx_ops:>10.0} ops/sec");

        let pipe_ops = bench_pipeline(&mut conn, iterations);
        println!("PIPE:     {pipe_ops:>10.0} ops/sec (100-cmd pipeline batches)");

        let direct_ops = bench_dispatch(store, iterations);
        println!("DIRECT:   {direct_ops:>10.0} ops/sec (no network)");

        println!("\n=== Done ===");
    })
    .await
    .unwrap();

    shutdown.cancel();
}
