//! Neighbor search statistics on a jittered particle block.
//!
//! Usage: `neighbor_stats [config.json]`
//!
//! Builds a lattice block, then for every step moves the particles a little,
//! rebuilds the grid, searches all neighborhoods and logs their statistics.
//! Particles are re-sorted along the Morton curve every `sort_interval` steps.
//! With `total_levels > 1` the right half of the block gets twice the
//! smoothing length and the multi-level grid is used.
//!
//! Set `RUST_LOG=info` to see per-step output.

use std::time::Instant;

use glam::{Vec2, Vec3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use sphcore::particles::SMOOTHING_LENGTH_RATIO;
use sphcore::{
    AdaptiveInnerNeighbors, BoundingBox, Error, InnerNeighbors, NeighborBuilder, NeighborhoodStats, ParticleStore,
    Result, SphParams, Vector,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
struct DemoConfig {
    params: SphParams,
    /// 2 or 3.
    dimension: usize,
    particles_per_side: usize,
    steps: usize,
    /// 0 disables sorting.
    sort_interval: usize,
    seed: u64,
    /// Random displacement per axis and step, in particle spacings.
    jitter: f32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            params: SphParams::default(),
            dimension: 2,
            particles_per_side: 64,
            steps: 10,
            sort_interval: 5,
            seed: 42,
            jitter: 0.05,
        }
    }
}

fn load_config() -> Result<DemoConfig> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(DemoConfig::default());
    };
    let text = std::fs::read_to_string(&path)
        .map_err(|e| Error::InvalidParam(format!("cannot read config '{}': {}", path, e)))?;
    let config: DemoConfig = serde_json::from_str(&text)
        .map_err(|e| Error::InvalidParam(format!("cannot parse config '{}': {}", path, e)))?;
    config.params.validate()?;
    if !(config.jitter.is_finite() && config.jitter >= 0.0) {
        return Err(Error::InvalidParam(format!("jitter must be non-negative, got {}", config.jitter)));
    }
    Ok(config)
}

fn lattice_block<V: Vector>(config: &DemoConfig, rng: &mut ChaCha8Rng) -> Vec<V> {
    let n = config.particles_per_side;
    let dp = config.params.particle_spacing;
    let nz = if V::DIM == 3 { n } else { 1 };
    let mut positions = Vec::with_capacity(n * n * nz);
    for k in 0..nz {
        for j in 0..n {
            for i in 0..n {
                let mut xyz = [0.0f32; 3];
                for (a, idx) in [i, j, k].into_iter().enumerate() {
                    let offset = rng.gen_range(-config.jitter..=config.jitter);
                    xyz[a] = (idx as f32 + 0.5 + offset) * dp;
                }
                positions.push(V::from_xyz(xyz));
            }
        }
    }
    positions
}

fn run<V: Vector>(config: &DemoConfig) -> Result<()> {
    let params = &config.params;
    let dp = params.particle_spacing;
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

    let positions: Vec<V> = lattice_block(config, &mut rng);
    let total = positions.len();
    let volume = params.particle_volume(V::DIM);
    let mut particles = ParticleStore::from_generated(positions, vec![volume; total], params.rest_density)?;
    particles.increase_all_particles_bounds(params.buffer_size(total));

    let half = 0.5 * config.particles_per_side as f32 * dp;
    let adaptive = params.total_levels > 1;
    if adaptive {
        let ratios: Vec<f32> = particles
            .positions()
            .iter()
            .map(|p| if p.axis(0) > half { 0.5 } else { 1.0 })
            .collect();
        let h_ratio = particles.register_variable(SMOOTHING_LENGTH_RATIO, 1.0f32)?;
        h_ratio[..total].copy_from_slice(&ratios);
        particles.add_variable_to_sort::<f32>(SMOOTHING_LENGTH_RATIO)?;
    }

    let extent = config.particles_per_side as f32 * dp;
    let bounds = BoundingBox::new(V::splat(-dp), V::splat(extent + dp));
    let mut search = params.create_neighbor_search(bounds)?;
    let kernel = params.kernel(V::DIM)?;
    log::info!(
        "{}D block: {} particles, h = {}, {}",
        V::DIM,
        total,
        kernel.smoothing_length(),
        search.name()
    );

    let mut configuration = Vec::new();
    let mut stats = NeighborhoodStats::default();
    for step in 0..config.steps {
        let n = particles.total_real_particles();
        for p in &mut particles.positions_mut()[..n] {
            let xyz = [
                rng.gen_range(-config.jitter..=config.jitter) * dp,
                rng.gen_range(-config.jitter..=config.jitter) * dp,
                rng.gen_range(-config.jitter..=config.jitter) * dp,
            ];
            *p += V::from_xyz(xyz);
        }

        let start = Instant::now();
        search.update_cell_lists(&particles);
        let built = start.elapsed();
        {
            let inner;
            let adaptive_inner;
            let builder: &dyn NeighborBuilder<V> = if adaptive {
                adaptive_inner = AdaptiveInnerNeighbors::new(kernel, particles.variable::<f32>(SMOOTHING_LENGTH_RATIO)?);
                &adaptive_inner
            } else {
                inner = InnerNeighbors::new(kernel);
                &inner
            };
            search.search_inner(&particles, &mut configuration, builder);
        }
        let searched = start.elapsed() - built;

        stats = NeighborhoodStats::from_configuration(&configuration[..n]);
        log::info!(
            "step {}: build {:?}, search {:?}, avg {:.2} max {} isolated {}",
            step,
            built,
            searched,
            stats.avg_neighbors,
            stats.max_neighbors,
            n - stats.particles_with_neighbors
        );

        if config.sort_interval > 0 && (step + 1) % config.sort_interval == 0 {
            let sequence = search.computing_sequence(&particles);
            particles.sort_particles_by_sequence(&sequence);
            log::debug!("step {}: particles sorted", step);
        }
    }

    let summary = serde_json::to_string_pretty(&stats)
        .map_err(|e| Error::InvalidParam(format!("cannot serialize statistics: {}", e)))?;
    println!("{}", summary);
    Ok(())
}

fn main() {
    env_logger::init();

    let result = load_config().and_then(|config| match config.dimension {
        2 => run::<Vec2>(&config),
        3 => run::<Vec3>(&config),
        d => Err(Error::InvalidParam(format!("dimension must be 2 or 3, got {}", d))),
    });
    if let Err(e) = result {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
