//! Simulation Context
//!
//! State shared by every object of one simulation: the particle budget,
//! the generation kill-switch, the joint collision-group counter and the
//! seeded random source. Threaded explicitly through every call that
//! needs it, so several simulations can coexist in one process.

use crate::config::SimConfig;
use crate::core::rng::DeterministicRng;

/// Default cap on live particles across all sources.
pub const MAX_PARTICLES: usize = 512;

/// First collision group handed to jointed blocks.
///
/// Group 0 holds normal physics blocks and group 1 background ones.
pub const FIRST_JOINT_GROUP: u32 = 2;

/// Last collision group before wrapping.
pub const LAST_JOINT_GROUP: u32 = 31;

/// Per-simulation shared state.
#[derive(Clone, Debug)]
pub struct SimContext {
    live_particles: usize,
    max_particles: usize,
    allow_particles: bool,
    collision_group: u32,
    world_gravity: f32,
    /// Random source used by particle emission
    pub rng: DeterministicRng,
}

impl Default for SimContext {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SimContext {
    /// Create a context with default limits.
    pub fn new(seed: u64) -> Self {
        Self {
            live_particles: 0,
            max_particles: MAX_PARTICLES,
            allow_particles: true,
            collision_group: FIRST_JOINT_GROUP,
            world_gravity: 9.81,
            rng: DeterministicRng::new(seed),
        }
    }

    /// Create a context from the configuration.
    pub fn from_config(config: &SimConfig) -> Self {
        let mut ctx = Self::new(config.rng_seed);
        ctx.max_particles = config.max_particles;
        ctx.allow_particles = config.allow_particles;
        ctx.world_gravity = config.world_gravity;
        ctx
    }

    /// Live particles across all sources.
    pub fn live_particles(&self) -> usize {
        self.live_particles
    }

    /// Particle cap.
    pub fn max_particles(&self) -> usize {
        self.max_particles
    }

    /// Whether particles are generated and animated at all.
    pub fn allow_particles(&self) -> bool {
        self.allow_particles
    }

    /// Turn particle generation on or off.
    pub fn set_allow_particles(&mut self, allow: bool) {
        self.allow_particles = allow;
    }

    /// Magnitude of the world gravity.
    pub fn world_gravity(&self) -> f32 {
        self.world_gravity
    }

    /// True when no particle may be spawned.
    pub fn has_reached_max_particles(&self) -> bool {
        self.live_particles >= self.max_particles || !self.allow_particles
    }

    pub(crate) fn particle_spawned(&mut self) {
        self.live_particles += 1;
    }

    pub(crate) fn particles_removed(&mut self, count: usize) {
        self.live_particles = self.live_particles.saturating_sub(count);
    }

    /// Group the next joint will use.
    pub fn current_collision_group(&self) -> u32 {
        self.collision_group
    }

    /// Take the current joint group and advance, wrapping after 31.
    pub fn next_collision_group(&mut self) -> u32 {
        let group = self.collision_group;
        self.collision_group += 1;
        if self.collision_group > LAST_JOINT_GROUP {
            self.collision_group = FIRST_JOINT_GROUP;
        }
        group
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collision_group_wraps() {
        let mut ctx = SimContext::new(1);
        let groups: Vec<u32> = (0..31).map(|_| ctx.next_collision_group()).collect();
        assert_eq!(groups[0], 2);
        assert_eq!(groups[29], 31);
        assert_eq!(groups[30], 2);
    }

    #[test]
    fn test_kill_switch_reaches_max() {
        let mut ctx = SimContext::new(1);
        assert!(!ctx.has_reached_max_particles());
        ctx.set_allow_particles(false);
        assert!(ctx.has_reached_max_particles());
    }

    #[test]
    fn test_from_config() {
        let config = SimConfig { max_particles: 8, rng_seed: 3, ..SimConfig::default() };
        let ctx = SimContext::from_config(&config);
        assert_eq!(ctx.max_particles(), 8);
        assert_eq!(ctx.rng, DeterministicRng::new(3));
    }
}
