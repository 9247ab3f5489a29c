use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use ulid::Ulid;

use vehicle_availability::service::{AvailabilityRequest, BlockMeta, HoldRequest};
use vehicle_availability::{
    AvailabilityService, BlockLedger, SchedulingPolicy, StaticCatalog, TimeOfDay, TimeRange,
    Vehicle,
};

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
        "    n={}, avg={:.3}ms, p50={:.3}ms, p95={:.3}ms, p99={:.3}ms, max={:.3}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

fn service(ledger: Arc<BlockLedger>, vehicles: Vec<Vehicle>) -> Arc<AvailabilityService> {
    let service = AvailabilityService::new(
        ledger,
        Arc::new(StaticCatalog::with_vehicles(vehicles)),
        SchedulingPolicy::default(),
    )
    .expect("default policy is valid");
    Arc::new(service)
}

fn fleet(n: usize) -> Vec<Vehicle> {
    (0..n)
        .map(|i| Vehicle::new(Ulid::new(), format!("Vehicle {i:03}"), 4 + (i as u32 % 4) * 4))
        .collect()
}

fn hour_window(hour: u16) -> Option<TimeRange> {
    TimeRange::new(TimeOfDay::from_hm(hour, 0)?, TimeOfDay::from_hm(hour + 1, 0)?)
}

/// One vehicle, one window, many concurrent checkouts. Exactly one may win.
async fn phase1_single_slot_race(ledger: Arc<BlockLedger>) {
    let vehicle = Ulid::new();
    let svc = service(ledger, vec![Vehicle::new(vehicle, "Contended", 10)]);
    let date = NaiveDate::from_ymd_opt(2030, 1, 1).expect("valid date");
    let n = 500;

    let start = Instant::now();
    let handles: Vec<_> = (0..n)
        .map(|_| {
            let svc = svc.clone();
            tokio::spawn(async move {
                let t = Instant::now();
                let result = svc
                    .create_hold_block(HoldRequest {
                        vehicle_id: vehicle,
                        date,
                        range: hour_window(10).expect("valid window"),
                        meta: BlockMeta::default(),
                    })
                    .await;
                (result, t.elapsed())
            })
        })
        .collect();

    let mut latencies = Vec::with_capacity(n);
    let mut winners = 0;
    for h in handles {
        let (result, elapsed) = h.await.expect("task panicked");
        latencies.push(elapsed);
        if let Ok(hold) = result {
            winners += 1;
            svc.release_hold(hold).await.expect("release");
        }
    }
    println!(
        "  {n} racing holds in {:.2}s: {winners} winner(s)",
        start.elapsed().as_secs_f64()
    );
    assert_eq!(winners, 1, "double booking");
    print_latency("hold latency", &mut latencies);
}

/// Disjoint windows across a fleet: throughput of uncontended holds.
async fn phase2_spread_holds(ledger: Arc<BlockLedger>) {
    let vehicles = fleet(50);
    let ids: Vec<Ulid> = vehicles.iter().map(|v| v.id).collect();
    let svc = service(ledger, vehicles);
    let date = NaiveDate::from_ymd_opt(2030, 1, 2).expect("valid date");

    let start = Instant::now();
    let handles: Vec<_> = ids
        .into_iter()
        .map(|vehicle_id| {
            let svc = svc.clone();
            tokio::spawn(async move {
                let mut placed = 0;
                for hour in 8..22 {
                    let Some(range) = hour_window(hour) else { continue };
                    let hold = svc
                        .create_hold_block(HoldRequest {
                            vehicle_id,
                            date,
                            range,
                            meta: BlockMeta::default(),
                        })
                        .await;
                    if let Ok(hold) = hold {
                        placed += 1;
                        let _ = svc.convert_hold(hold, Ulid::new()).await;
                    }
                }
                placed
            })
        })
        .collect();
    let mut total = 0;
    for h in handles {
        total += h.await.expect("task panicked");
    }
    let elapsed = start.elapsed();
    println!(
        "  {total} hold+convert pairs in {:.2}s = {:.0} ops/sec",
        elapsed.as_secs_f64(),
        total as f64 / elapsed.as_secs_f64()
    );
}

/// Availability checks against a partly booked fleet.
async fn phase3_check_latency(ledger: Arc<BlockLedger>) {
    let vehicles = fleet(50);
    let ids: Vec<Ulid> = vehicles.iter().map(|v| v.id).collect();
    let svc = service(ledger, vehicles);
    let date = NaiveDate::from_ymd_opt(2030, 1, 3).expect("valid date");
    for (i, vehicle_id) in ids.iter().enumerate().filter(|(i, _)| i % 2 == 0) {
        let hour = 8 + (i as u16 % 12);
        if let Some(range) = hour_window(hour) {
            let _ = svc
                .create_hold_block(HoldRequest {
                    vehicle_id: *vehicle_id,
                    date,
                    range,
                    meta: BlockMeta::default(),
                })
                .await;
        }
    }

    let mut latencies = Vec::with_capacity(2000);
    for i in 0..2000u16 {
        let request = AvailabilityRequest {
            date,
            start_time: TimeOfDay::from_hm(8 + i % 12, 0).expect("valid time"),
            duration_hours: 2.0,
            party_size: 1 + u32::from(i % 12),
            brand_id: None,
        };
        let t = Instant::now();
        svc.check_availability(&request).await.expect("check");
        latencies.push(t.elapsed());
    }
    print_latency("check_availability", &mut latencies);
}

#[tokio::main]
async fn main() {
    println!("=== vehicle availability hold contention benchmark ===\n");

    let ledger = match std::env::var("FLEET_BENCH_WAL") {
        Ok(path) => {
            println!("WAL: {path}");
            let _ = std::fs::remove_file(&path);
            Arc::new(BlockLedger::open(std::path::Path::new(&path)).expect("open WAL"))
        }
        Err(_) => {
            println!("WAL: none (in-memory)");
            Arc::new(BlockLedger::in_memory())
        }
    };

    println!("\n[phase 1] single-slot race");
    phase1_single_slot_race(ledger.clone()).await;

    println!("\n[phase 2] spread holds across the fleet");
    phase2_spread_holds(ledger.clone()).await;

    println!("\n[phase 3] availability check latency");
    phase3_check_latency(ledger.clone()).await;

    println!("\n{} live blocks", ledger.block_count());
}
