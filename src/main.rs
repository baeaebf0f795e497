//! Neuroevolution CLI - Evolve controllers for the reach-target task from JSON configuration.

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::fs;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::thread;
use std::time::Instant;

use neuroevo::{
    compute::{
        ReachTargetConfig, ReachTargetEnvironment, anomaly,
        evolution::{GenerationOrchestrator, OrchestratorControl},
    },
    schema::EngineConfig,
};

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <config.json> [generations]", args[0]);
        eprintln!();
        eprintln!("Evolve network controllers for the reach-target environment.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  config.json  Path to engine configuration file");
        eprintln!("  generations  Number of generations to run (default: 100)");
        eprintln!();
        eprintln!("Commands on stdin while running:");
        eprintln!("  stop         Stop after the current tick");
        eprintln!("  next         End the current generation now");
        eprintln!("  save         Save the best genome now");
        eprintln!("  speed <f>    Set the simulation time scale");
        eprintln!();
        eprintln!("Example configuration is generated with --example flag.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_config();
        return;
    }

    let config_path = PathBuf::from(&args[1]);
    let generations: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(100);

    let config_str = fs::read_to_string(&config_path).unwrap_or_else(|e| {
        eprintln!("Error reading config file: {}", e);
        std::process::exit(1);
    });

    let mut config: EngineConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        std::process::exit(1);
    });
    fit_network_to_environment(&mut config);

    println!("Neuroevolution");
    println!("==============");
    println!("Layers: {:?}", config.network.layer_sizes);
    println!("Activation: {:?}", config.network.activation);
    println!("Population: {}", config.evolution.population_size);
    println!("Generations: {}", generations);
    if let Some(dir) = &config.checkpoint.directory {
        println!("Checkpoints: {}", dir.display());
    }
    println!();

    let environment = ReachTargetEnvironment::new(ReachTargetConfig::default(), config.random_seed);
    let mut orchestrator = GenerationOrchestrator::new(config, environment).unwrap_or_else(|e| {
        eprintln!("Error starting evolution: {}", e);
        std::process::exit(1);
    });
    spawn_console(orchestrator.control());

    let start = Instant::now();
    let summary = orchestrator.run_with_callback(generations, |outcome| {
        println!(
            "  Gen {:>4}: best={:>8.3} mean={:>8.3} success={}/{} diversity={:.3} ({:?})",
            outcome.report.generation,
            outcome.report.best_fitness,
            outcome.report.mean_fitness,
            outcome.stats.successes,
            outcome.stats.agents,
            outcome.report.diversity,
            outcome.end
        );
    });
    let elapsed = start.elapsed();

    println!();
    println!("Finished: {:?}", summary.stop_reason);
    println!("  Generations: {}", summary.generations);
    match summary.best_fitness {
        Some(best) => println!("  Best fitness: {:.3}", best),
        None => println!("  Best fitness: none recorded"),
    }
    let anomalies: Vec<String> = anomaly::totals()
        .into_iter()
        .filter(|(_, n)| *n > 0)
        .map(|(kind, n)| format!("{kind}={n}"))
        .collect();
    if !anomalies.is_empty() {
        println!("  Anomalies: {}", anomalies.join(", "));
    }
    println!(
        "Time: {:.2}s ({:.2} generations/s)",
        elapsed.as_secs_f32(),
        summary.generations as f32 / elapsed.as_secs_f32().max(1e-6)
    );
}

/// Force the outer layer sizes to match the reach-target environment.
fn fit_network_to_environment(config: &mut EngineConfig) {
    let layers = &mut config.network.layer_sizes;
    if layers.len() < 2 {
        return;
    }
    let last = layers.len() - 1;
    if layers[0] != ReachTargetEnvironment::INPUTS || layers[last] != ReachTargetEnvironment::OUTPUTS
    {
        eprintln!(
            "Adjusting layers {:?} to {} inputs and {} outputs",
            layers,
            ReachTargetEnvironment::INPUTS,
            ReachTargetEnvironment::OUTPUTS
        );
        layers[0] = ReachTargetEnvironment::INPUTS;
        layers[last] = ReachTargetEnvironment::OUTPUTS;
    }
}

/// Read control commands from stdin on a background thread.
fn spawn_console(control: OrchestratorControl) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            let mut words = line.split_whitespace();
            match (words.next(), words.next()) {
                (Some("stop"), _) => control.stop(),
                (Some("next"), _) => control.advance(),
                (Some("save"), _) => control.request_checkpoint(),
                (Some("speed"), Some(value)) => match value.parse::<f32>() {
                    Ok(scale) => println!("Time scale: {}", control.set_time_scale(scale)),
                    Err(_) => eprintln!("Invalid speed: {}", value),
                },
                (None, _) => {}
                _ => eprintln!("Unknown command: {}", line.trim()),
            }
        }
    });
}

fn print_example_config() {
    let mut config = EngineConfig::default();
    config.network.layer_sizes = vec![
        ReachTargetEnvironment::INPUTS,
        16,
        ReachTargetEnvironment::OUTPUTS,
    ];
    config.checkpoint.directory = Some(PathBuf::from("checkpoints"));
    config.random_seed = Some(42);

    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing example config: {}", e),
    }
}
