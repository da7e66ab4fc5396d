use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use ulid::Ulid;

use shopfloor::clock::ManualClock;
use shopfloor::collaborators::{CatalogService, InMemoryCatalog};
use shopfloor::config::ShopConfig;
use shopfloor::engine::{Collaborators, Engine, NewBooking, TaskPlan};
use shopfloor::model::{DAY_MS, HOUR_MS, MINUTE_MS, Ms, TechnicianAssignment, TechnicianRole};

/// 2027-09-24 00:00 UTC.
const DAY0: Ms = 1_821_744_000_000;
const SLOTS_PER_DAY: i64 = 18;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
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
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

struct Shop {
    engine: Arc<Engine>,
    service_id: Ulid,
}

async fn open_shop(label: &str, bays: usize) -> Shop {
    let dir = std::env::temp_dir().join(format!("shopfloor_bench_{label}_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();

    let service_id = Ulid::new();
    let catalog = Arc::new(InMemoryCatalog::new([CatalogService {
        id: service_id,
        name: "Full inspection".into(),
        price: 9_900,
    }]));
    let config = ShopConfig {
        lookahead: 30 * DAY_MS,
        ..ShopConfig::default()
    };
    let deps = Collaborators::new(catalog).with_clock(Arc::new(ManualClock::new(DAY0 + 9 * HOUR_MS)));
    let engine = Arc::new(Engine::new(dir.join("shopfloor.wal"), config, deps).unwrap());
    for i in 0..bays {
        engine.add_bay(&format!("Bay {}", i + 1)).await.unwrap();
    }
    Shop { engine, service_id }
}

/// The n-th bookable slot start from tomorrow on, one per slot.
fn slot_start(n: i64) -> Ms {
    let day = 1 + n / SLOTS_PER_DAY;
    DAY0 + day * DAY_MS + 8 * HOUR_MS + (n % SLOTS_PER_DAY) * 30 * MINUTE_MS
}

fn booking(service_id: Ulid, n: i64) -> NewBooking {
    NewBooking {
        customer_id: Ulid::new(),
        vehicle_id: Ulid::new(),
        service_ids: vec![service_id],
        slot_start: slot_start(n),
    }
}

fn plan(minutes: u32) -> TaskPlan {
    TaskPlan {
        technicians: vec![TechnicianAssignment {
            technician_id: Ulid::new(),
            role: TechnicianRole::Lead,
        }],
        expected_duration_in_minutes: minutes,
    }
}

async fn phase1_sequential_bookings() {
    let shop = open_shop("sequential", 1).await;
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let t = Instant::now();
        shop.engine
            .create_booking(booking(shop.service_id, i as i64))
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("booking latency", &mut latencies);
}

async fn phase2_concurrent_scheduling() {
    let n_bays = 8;
    let n_orders = 400;
    let shop = open_shop("scheduling", n_bays).await;

    let mut orders = Vec::with_capacity(n_orders);
    for i in 0..n_orders {
        let b = shop
            .engine
            .create_booking(booking(shop.service_id, i as i64))
            .await
            .unwrap();
        let order = shop.engine.check_in_booking(Ulid::new(), b.id).await.unwrap();
        orders.push(order.id);
    }

    let start = Instant::now();
    let mut handles = Vec::new();
    for (i, order_id) in orders.into_iter().enumerate() {
        let engine = shop.engine.clone();
        let minutes = 30 + (i as u32 % 4) * 15;
        handles.push(tokio::spawn(async move {
            let t = Instant::now();
            engine.schedule_inspection(order_id, plan(minutes)).await.unwrap();
            t.elapsed()
        }));
    }
    let mut latencies = Vec::with_capacity(n_orders);
    for h in handles {
        latencies.push(h.await.unwrap());
    }

    let elapsed = start.elapsed();
    let ops = n_orders as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_orders} inspections on {n_bays} bays in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
    print_latency("schedule latency", &mut latencies);

    let mut reserved = 0;
    for bay in shop.engine.list_bays().await {
        let schedule = shop.engine.bay_schedule(bay.id).await.unwrap();
        for pair in schedule.reservations.windows(2) {
            assert!(
                pair[0].span.end <= pair[1].span.start,
                "overlapping reservations on bay {}",
                bay.id
            );
        }
        reserved += schedule.reservations.len();
    }
    assert_eq!(reserved, n_orders);
    println!("  no overlapping reservations across {reserved} tasks");
}

async fn phase3_slots_under_load() {
    let shop = open_shop("slots", 1).await;
    for i in 0..500 {
        shop.engine
            .create_booking(booking(shop.service_id, i))
            .await
            .unwrap();
    }

    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..4i64 {
        let engine = shop.engine.clone();
        let service_id = shop.service_id;
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let mut i = 0i64;
            while !stop.load(Ordering::Relaxed) {
                // Writers spread over later days so slots never fill up.
                let _ = engine
                    .create_booking(booking(service_id, 1_000 + w * 100_000 + i))
                    .await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();
    for r in 0..n_readers {
        let engine = shop.engine.clone();
        reader_handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for i in 0..reads_per_reader {
                let day = 25 + ((r + i) % 5) as u32;
                let t = Instant::now();
                engine.available_time_slots(2027, 9, day).await.unwrap();
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

    print_latency("available slots query", &mut all_latencies);
}

#[tokio::main]
async fn main() {
    println!("=== shopfloor stress benchmark ===\n");

    println!("[phase 1] sequential booking throughput");
    phase1_sequential_bookings().await;

    println!("\n[phase 2] concurrent bay scheduling");
    phase2_concurrent_scheduling().await;

    println!("\n[phase 3] slot queries under booking load");
    phase3_slots_under_load().await;

    println!("\n=== done ===");
}
