//! # Tideflow Headless
//!
//! Runs the two-floor basin scenario without a host application and prints
//! a summary.
//!
//! ```bash
//! ./tideflow_headless                 # defaults, 600 steps
//! ./tideflow_headless 2000            # defaults, 2000 steps
//! ./tideflow_headless flow.toml 2000  # custom engine config
//! ```

use tideflow::{run_headless, HeadlessArgs};

fn main() {
    println!("═══════════════════════════════════════════════════════════════════");
    println!("                    TIDEFLOW HEADLESS v{}", env!("CARGO_PKG_VERSION"));
    println!("═══════════════════════════════════════════════════════════════════");
    println!();

    let args = match HeadlessArgs::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("   ✗ {e}");
            eprintln!("     usage: tideflow_headless [config.toml] [ticks]");
            std::process::exit(2);
        }
    };
    let config = match args.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("   ✗ FATAL: {e}");
            std::process::exit(1);
        }
    };

    match &args.config {
        Some(path) => println!("  Config:   {}", path.display()),
        None => println!("  Config:   defaults"),
    }
    println!("  Seed:     {}", config.seed);
    println!("  Steps:    {}", args.ticks);
    println!();

    let summary = match run_headless(config, args.ticks) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("   ✗ FATAL: {e}");
            std::process::exit(1);
        }
    };

    println!("─── WORLD ─────────────────────────────────────────────────────────");
    println!("  Final tick:     {}", summary.final_tick);
    println!("  Spring placed:  {}", summary.spring_placed);
    println!("  Hall volume:    {}", summary.hall_volume);
    println!("  Cellar volume:  {}", summary.cellar_volume);
    println!("  Total volume:   {}", summary.total_volume);
    println!("  Live cells:     {}", summary.live_cells);
    println!("  Active cells:   {}", summary.active_cells);
    println!();

    let frame = summary.frame;
    println!("─── TIMING ────────────────────────────────────────────────────────");
    match frame.min_step() {
        Some(min) => println!(
            "  Step µs:        min {min} / avg {} / max {}",
            frame.avg_step_us, frame.max_step_us
        ),
        None => println!("  Step µs:        no working steps"),
    }
    println!("  Late steps:     {}", frame.late_steps);
    println!("  Skipped steps:  {}", frame.skipped_steps);
    println!("  Cells processed:{:>8}", frame.cells_processed);
    println!();

    let flow = summary.flow;
    println!("─── FLOW ──────────────────────────────────────────────────────────");
    println!("  Transfers:      {} ({} gravity)", flow.transfers, flow.gravity_transfers);
    println!(
        "  Pressure:       {} delivered / {} trapped",
        flow.pressure_deliveries, flow.pressure_trapped
    );
    println!("  Splash units:   {}", flow.splash_units);
    println!("  Equalized:      {}", flow.equalized_regions);
    println!("  Evaporated:     {}", flow.evaporated_units);
    println!("  Stabilized:     {}", flow.stabilized);
    println!("  Saturated:      {} steps", flow.saturated_steps);
    println!(
        "  Events:         +{} / -{} cells, {} changes",
        summary.events.created, summary.events.destroyed, summary.events.changed
    );

    if summary.total_volume == summary.spring_placed.saturating_sub(flow.evaporated_units) {
        println!();
        println!("  ✓ volume conserved");
    } else {
        println!();
        println!("  ✗ volume drift detected");
        std::process::exit(1);
    }
}
