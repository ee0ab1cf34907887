use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use std::time::Duration;
use swarmsim_core::{ControlCommand, Position, Simulation, SwarmConfig, apply_control_command};

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

fn bench_world_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("world_step");
    group.sample_size(env_usize("SWARM_BENCH_SAMPLES", 30));
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(
        env_usize("SWARM_BENCH_MEASURE_SECS", 10) as u64,
    ));
    let steps = env_usize("SWARM_BENCH_STEPS", 64);
    let populations: Vec<usize> = std::env::var("SWARM_BENCH_AGENTS")
        .ok()
        .map(|s| {
            s.split(',')
                .filter_map(|t| t.trim().parse::<usize>().ok())
                .collect::<Vec<_>>()
        })
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| vec![24, 96, 384]);

    for &agents in &populations {
        group.bench_function(format!("steps{steps}_agents{agents}"), |b| {
            b.iter_batched(
                || {
                    let mut config = SwarmConfig {
                        rng_seed: Some(0xBEEF_u64),
                        history_capacity: steps + 1,
                        ..SwarmConfig::default()
                    };
                    config.population.friendly_count = agents / 2;
                    config.population.friendly_columns = 16;
                    config.population.friendly_spacing = 30.0;
                    config.population.friendly_origin = Position::new(20.0, 600.0);
                    config.population.enemy_count = agents - agents / 2;
                    config.avoidance.enabled = true;
                    config.stuck.enabled = true;
                    let mut sim = Simulation::new(config).expect("sim");
                    // Half the squad flies as one group, the other half hunts.
                    let ids: Vec<String> = (1..=agents / 2).map(|i| format!("drone_{i}")).collect();
                    let (movers, hunters) = ids.split_at(ids.len() / 2);
                    apply_control_command(
                        &mut sim,
                        ControlCommand::Move {
                            agent_ids: movers.to_vec(),
                            target: Position::new(500.0, 500.0),
                        },
                    )
                    .expect("move");
                    apply_control_command(
                        &mut sim,
                        ControlCommand::Task {
                            task: "intercept".into(),
                            params: swarmsim_core::TaskParams {
                                agent_ids: hunters.to_vec(),
                                target_id: Some("enemy_1".into()),
                                ..Default::default()
                            },
                        },
                    )
                    .expect("intercept");
                    sim
                },
                |mut sim| {
                    for _ in 0..steps {
                        sim.step();
                    }
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_world_steps);
criterion_main!(benches);
