use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_postgres::{Client, Config, NoTls};
use ulid::Ulid;

const DAY: i64 = 86_400_000;
const JAN_1_2100: i64 = 4_102_444_800_000;

async fn connect(host: &str, port: u16) -> Client {
    let password = std::env::var("CARLOT_PASSWORD").unwrap_or_else(|_| "carlot".into());
    let mut config = Config::new();
    config
        .host(host)
        .port(port)
        .dbname("carlot")
        .user("carlot")
        .password(password);

    let (client, conn) = config.connect(NoTls).await.expect("connect failed");
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            eprintln!("connection error: {e}");
        }
    });
    client
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

/// Agency and customer every booking in a run points at.
#[derive(Clone, Copy)]
struct Counter {
    agency: Ulid,
    user: Ulid,
}

async fn setup(client: &Client) -> Counter {
    let counter = Counter {
        agency: Ulid::new(),
        user: Ulid::new(),
    };
    client
        .batch_execute(&format!(
            "INSERT INTO agencies VALUES ('{}', 'Bench Agency');
             INSERT INTO users VALUES ('{}', 'Bench User');",
            counter.agency, counter.user
        ))
        .await
        .unwrap();
    counter
}

async fn add_car(client: &Client, counter: Counter) -> Ulid {
    let car = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO cars VALUES ('{car}', '{}', '49.90', 0)",
            counter.agency
        ))
        .await
        .unwrap();
    car
}

/// Book `car` for day `slot` (two-day stride so neighbours never touch).
fn book_sql(counter: Counter, car: Ulid, slot: i64) -> String {
    let start = JAN_1_2100 + slot * 2 * DAY;
    let end = start + DAY;
    format!(
        "INSERT INTO rentals VALUES ('{}', '{}', '{car}', {start}, {end}, '{}')",
        Ulid::new(),
        counter.user,
        counter.agency
    )
}

async fn phase1_sequential(host: &str, port: u16, counter: Counter) {
    let client = connect(host, port).await;
    let car = add_car(&client, counter).await;

    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let t = Instant::now();
        client
            .batch_execute(&book_sql(counter, car, i as i64))
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

async fn phase2_fleet(host: &str, port: u16, counter: Counter) {
    let n_tasks = 10;
    let n_per_task = 200;

    let start = Instant::now();
    let mut handles = Vec::new();

    for _ in 0..n_tasks {
        let host = host.to_string();
        handles.push(tokio::spawn(async move {
            let client = connect(&host, port).await;
            let car = add_car(&client, counter).await;
            for j in 0..n_per_task {
                client
                    .batch_execute(&book_sql(counter, car, j))
                    .await
                    .unwrap();
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} cars x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

/// Many clients race for the same window on the same car. Exactly one wins
/// each round.
async fn phase3_contention(host: &str, port: u16, counter: Counter) {
    let rounds = 50;
    let racers = 20;

    let setup_client = connect(host, port).await;
    let car = add_car(&setup_client, counter).await;
    drop(setup_client);

    let mut clients = Vec::with_capacity(racers);
    for _ in 0..racers {
        clients.push(Arc::new(connect(host, port).await));
    }

    let mut latencies = Vec::with_capacity(rounds * racers);
    let mut double_bookings = 0;
    for round in 0..rounds {
        let mut handles = Vec::new();
        for client in &clients {
            let client = client.clone();
            let sql = book_sql(counter, car, round as i64);
            handles.push(tokio::spawn(async move {
                let t = Instant::now();
                let ok = client.batch_execute(&sql).await.is_ok();
                (ok, t.elapsed())
            }));
        }
        let mut winners = 0;
        for h in handles {
            let (ok, elapsed) = h.await.unwrap();
            winners += usize::from(ok);
            latencies.push(elapsed);
        }
        if winners != 1 {
            double_bookings += 1;
        }
    }

    println!("  {rounds} rounds x {racers} racers, rounds without exactly one winner: {double_bookings}");
    print_latency("contended booking", &mut latencies);
}

async fn phase4_read_under_load(host: &str, port: u16, counter: Counter) {
    let setup_client = connect(host, port).await;
    let car = add_car(&setup_client, counter).await;
    for i in 0..200 {
        setup_client
            .batch_execute(&book_sql(counter, car, i))
            .await
            .unwrap();
    }
    drop(setup_client);

    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for _ in 0..5 {
        let host = host.to_string();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let client = connect(&host, port).await;
            let wcar = add_car(&client, counter).await;
            let mut i = 0i64;
            while !stop.load(Ordering::Relaxed) {
                let _ = client.batch_execute(&book_sql(counter, wcar, i)).await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();
    for _ in 0..n_readers {
        let host = host.to_string();
        reader_handles.push(tokio::spawn(async move {
            let client = connect(&host, port).await;
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for _ in 0..reads_per_reader {
                let t = Instant::now();
                client
                    .batch_execute(&format!(
                        "SELECT * FROM conflicts WHERE car_id = '{car}' AND start_date >= {} AND end_date <= {}",
                        JAN_1_2100,
                        JAN_1_2100 + 60 * DAY
                    ))
                    .await
                    .unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }

    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("conflict query", &mut all_latencies);
}

async fn phase5_connection_storm(host: &str, port: u16, counter: Counter) {
    let n_conns = 50;
    let ops_per_conn = 10;

    let start = Instant::now();
    let mut handles = Vec::new();
    let success = Arc::new(AtomicUsize::new(0));

    for _ in 0..n_conns {
        let host = host.to_string();
        let success = success.clone();
        handles.push(tokio::spawn(async move {
            let client = connect(&host, port).await;
            let car = add_car(&client, counter).await;
            for i in 0..ops_per_conn {
                client
                    .batch_execute(&book_sql(counter, car, i))
                    .await
                    .unwrap();
            }
            success.fetch_add(1, Ordering::Relaxed);
        }));
    }

    for h in handles {
        let _ = h.await;
    }

    let elapsed = start.elapsed();
    let ok = success.load(Ordering::Relaxed);
    println!(
        "  {n_conns} connections, {ops_per_conn} ops each: {ok}/{n_conns} succeeded in {:.2}s",
        elapsed.as_secs_f64()
    );
}

#[tokio::main]
async fn main() {
    let host = std::env::var("CARLOT_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port: u16 = std::env::var("CARLOT_PORT")
        .unwrap_or_else(|_| "5433".into())
        .parse()
        .expect("invalid CARLOT_PORT");

    println!("=== carlot stress benchmark ===");
    println!("target: {host}:{port}\n");

    println!("[setup]");
    let setup_client = connect(&host, port).await;
    let counter = setup(&setup_client).await;
    drop(setup_client);

    println!("\n[phase 1] sequential bookings on one car");
    phase1_sequential(&host, port, counter).await;

    println!("\n[phase 2] concurrent bookings across the fleet");
    phase2_fleet(&host, port, counter).await;

    println!("\n[phase 3] contention on a single window");
    phase3_contention(&host, port, counter).await;

    println!("\n[phase 4] read latency under write load");
    phase4_read_under_load(&host, port, counter).await;

    println!("\n[phase 5] connection storm");
    phase5_connection_storm(&host, port, counter).await;

    println!("\n=== benchmark complete ===");
}
