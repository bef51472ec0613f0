//! Script Motions
//!
//! Level scripts attach periodic motions to entities and blocks: a circle
//! around an initial angle, a back-and-forth translation, or a spin around
//! the object's own center. Physics blocks get the same laws as forces and
//! torques instead of direct moves.
//!
//! Motions advance in whole centiseconds. Each motion has a start/end window
//! relative to its own clock; an end of 0 means it runs forever.

use std::f64::consts::PI;

use tracing::trace;

use crate::core::vec2::Vector2f;

/// Force applied per step for each unit of translation of a physics block.
pub const PHYSICS_TRANSLATION_FORCE: f32 = 25_000.0;

/// What a motion acts upon, as seen from the scene.
pub trait MotionSink {
    /// `Some(alive)` for a known entity.
    fn entity_alive(&self, id: &str) -> Option<bool>;

    /// Move an entity (and its collision cells).
    fn translate_entity(&mut self, id: &str, dx: f32, dy: f32);

    /// Add to an entity's draw angle.
    fn rotate_entity(&mut self, id: &str, angle: f32);

    /// Current rotation of a block, `None` when unknown.
    fn block_rotation(&self, id: &str) -> Option<f32>;

    /// Move a dynamic block.
    fn move_block(&mut self, id: &str, dx: f32, dy: f32);

    /// Set a dynamic block's rotation.
    fn set_block_rotation(&mut self, id: &str, angle: f32);

    /// True when the block is driven by the physics engine.
    fn has_physics_body(&self, id: &str) -> bool;

    /// Hand a force or torque to the physics engine.
    fn physics_command(&mut self, command: PhysicsCommand);
}

/// Request for the external physics engine.
#[derive(Clone, Debug, PartialEq)]
pub enum PhysicsCommand {
    /// Apply a force at the body's center.
    ApplyForce {
        /// Block id
        block_id: String,
        /// Force vector
        force: Vector2f,
    },
    /// Add to the body's torque.
    AddTorque {
        /// Block id
        block_id: String,
        /// Torque increment
        torque: f32,
    },
}

// =============================================================================
// Laws
// =============================================================================

/// Circular motion around a center at `radius`, one turn per period.
#[derive(Clone, Debug, PartialEq)]
pub struct RotationLaw {
    speed: f32,
    angle: f32,
    radius: f32,
    center: Vector2f,
    previous: Vector2f,
}

impl RotationLaw {
    /// Start at `init_angle` (radians).
    pub fn new(init_angle: f32, radius: f32, period: i32) -> Self {
        let speed = if period != 0 { (2.0 * PI / period as f64) as f32 } else { 0.0 };
        Self {
            speed,
            angle: init_angle,
            radius,
            center: Vector2f::new(init_angle.cos() * radius, init_angle.sin() * radius),
            previous: Vector2f::ZERO,
        }
    }

    /// Displacement for one centisecond.
    pub fn step(&mut self) -> Vector2f {
        if self.angle as f64 >= 2.0 * PI {
            self.angle = (self.angle as f64 - 2.0 * PI) as f32;
        }
        let position = Vector2f::new(self.angle.cos() * self.radius, self.angle.sin() * self.radius) - self.center;
        let delta = position - self.previous;
        self.previous = position;
        self.angle += self.speed;
        delta
    }
}

/// Back and forth along a vector, covering it twice per period.
#[derive(Clone, Debug, PartialEq)]
pub struct TranslationLaw {
    amplitude: Vector2f,
    step: Vector2f,
    total: Vector2f,
    forward: bool,
}

impl TranslationLaw {
    /// Oscillate between the origin and `amplitude`.
    pub fn new(amplitude: Vector2f, period: i32) -> Self {
        let length = amplitude.length();
        let speed = if period != 0 { length * 2.0 / period as f32 } else { 0.0 };
        let step = if length != 0.0 { amplitude * (speed / length) } else { Vector2f::ZERO };
        Self { amplitude, step, total: Vector2f::ZERO, forward: true }
    }

    /// Displacement for one centisecond.
    pub fn step(&mut self) -> Vector2f {
        let v = if self.forward { self.step } else { -self.step };
        let sign = if self.forward { 1.0 } else { -1.0 };
        self.total.x += sign * v.x.abs();
        self.total.y += sign * v.y.abs();

        if self.total.x < 0.0
            || self.total.x > self.amplitude.x.abs()
            || self.total.y < 0.0
            || self.total.y > self.amplitude.y.abs()
        {
            self.forward = !self.forward;
        }
        v
    }
}

/// Spin of one turn per period, corrected once per period for float drift.
#[derive(Clone, Debug, PartialEq)]
pub struct SelfRotationLaw {
    period: i32,
    total: f32,
    increments: i32,
}

impl SelfRotationLaw {
    /// Negative periods spin clockwise.
    pub fn new(period: i32) -> Self {
        Self { period, total: 0.0, increments: 0 }
    }

    /// Angle increment for one centisecond.
    pub fn step(&mut self) -> f32 {
        if self.period == 0 {
            return 0.0;
        }
        let mut angle = (2.0 * PI / self.period as f64) as f32;
        self.increments += 1;
        self.total += angle;

        if self.increments >= self.period.abs() {
            let exact = (self.increments as f64 * 2.0 * PI / self.period as f64) as f32;
            angle += exact - self.total;
            self.increments = 0;
            self.total = 0.0;
        }
        angle
    }
}

/// Motion law attached to an object.
#[derive(Clone, Debug, PartialEq)]
pub enum MotionKind {
    /// Entity circling.
    EntityRotation(RotationLaw),
    /// Entity sliding.
    EntityTranslation(TranslationLaw),
    /// Entity spinning.
    EntitySelfRotation(SelfRotationLaw),
    /// Dynamic block circling.
    BlockRotation(RotationLaw),
    /// Dynamic block sliding.
    BlockTranslation(TranslationLaw),
    /// Dynamic block spinning.
    BlockSelfRotation(SelfRotationLaw),
    /// Constant torque on a physics block.
    PhysicsSelfRotation {
        /// Torque added each centisecond
        torque: i32,
    },
    /// Sliding force on a physics block.
    PhysicsTranslation(TranslationLaw),
}

impl MotionKind {
    fn is_entity(&self) -> bool {
        matches!(
            self,
            MotionKind::EntityRotation(_) | MotionKind::EntityTranslation(_) | MotionKind::EntitySelfRotation(_)
        )
    }

    /// One centisecond of a kinematic law: displacement and angle step.
    fn step(&mut self) -> (Vector2f, f32) {
        match self {
            MotionKind::EntityRotation(law) | MotionKind::BlockRotation(law) => (law.step(), 0.0),
            MotionKind::EntityTranslation(law) | MotionKind::BlockTranslation(law) => (law.step(), 0.0),
            MotionKind::EntitySelfRotation(law) | MotionKind::BlockSelfRotation(law) => (Vector2f::ZERO, law.step()),
            MotionKind::PhysicsSelfRotation { .. } | MotionKind::PhysicsTranslation(_) => (Vector2f::ZERO, 0.0),
        }
    }
}

// =============================================================================
// Motion
// =============================================================================

/// A motion bound to one object with its own clock.
#[derive(Clone, Debug, PartialEq)]
pub struct ScriptMotion {
    object_id: String,
    kind: MotionKind,
    start_time: i32,
    end_time: i32,
    period: i32,
    time: i32,
}

impl ScriptMotion {
    fn new(object_id: impl Into<String>, kind: MotionKind, start_time: i32, end_time: i32, period: i32) -> Self {
        Self { object_id: object_id.into(), kind, start_time, end_time, period, time: 0 }
    }

    /// Circle an entity.
    pub fn entity_rotation(id: impl Into<String>, init_angle: f32, radius: f32, period: i32, start: i32, end: i32) -> Self {
        Self::new(id, MotionKind::EntityRotation(RotationLaw::new(init_angle, radius, period)), start, end, period)
    }

    /// Slide an entity.
    pub fn entity_translation(id: impl Into<String>, x: f32, y: f32, period: i32, start: i32, end: i32) -> Self {
        let law = TranslationLaw::new(Vector2f::new(x, y), period);
        Self::new(id, MotionKind::EntityTranslation(law), start, end, period)
    }

    /// Spin an entity.
    pub fn entity_self_rotation(id: impl Into<String>, period: i32, start: i32, end: i32) -> Self {
        Self::new(id, MotionKind::EntitySelfRotation(SelfRotationLaw::new(period)), start, end, period)
    }

    /// Circle a block.
    pub fn block_rotation(id: impl Into<String>, init_angle: f32, radius: f32, period: i32, start: i32, end: i32) -> Self {
        Self::new(id, MotionKind::BlockRotation(RotationLaw::new(init_angle, radius, period)), start, end, period)
    }

    /// Slide a block.
    pub fn block_translation(id: impl Into<String>, x: f32, y: f32, period: i32, start: i32, end: i32) -> Self {
        let law = TranslationLaw::new(Vector2f::new(x, y), period);
        Self::new(id, MotionKind::BlockTranslation(law), start, end, period)
    }

    /// Spin a block.
    pub fn block_self_rotation(id: impl Into<String>, period: i32, start: i32, end: i32) -> Self {
        Self::new(id, MotionKind::BlockSelfRotation(SelfRotationLaw::new(period)), start, end, period)
    }

    /// Torque a physics block.
    pub fn physics_self_rotation(id: impl Into<String>, torque: i32, start: i32, end: i32) -> Self {
        Self::new(id, MotionKind::PhysicsSelfRotation { torque }, start, end, 1)
    }

    /// Push a physics block back and forth.
    pub fn physics_translation(id: impl Into<String>, x: f32, y: f32, period: i32, start: i32, end: i32) -> Self {
        let law = TranslationLaw::new(Vector2f::new(x, y), period);
        Self::new(id, MotionKind::PhysicsTranslation(law), start, end, period)
    }

    /// Entity or block id.
    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    /// Attached law.
    pub fn kind(&self) -> &MotionKind {
        &self.kind
    }

    /// Period in centiseconds.
    pub fn period(&self) -> i32 {
        self.period
    }

    /// Own clock in centiseconds.
    pub fn time(&self) -> i32 {
        self.time
    }

    fn is_over(&self) -> bool {
        self.end_time != 0 && self.time >= self.end_time
    }

    /// True while the clock is inside the start/end window.
    pub fn is_time_to_move(&self) -> bool {
        self.time >= self.start_time && (self.time <= self.end_time || self.end_time == 0)
    }

    /// Advance `cents` centiseconds; false once the motion is over.
    ///
    /// The part of the step before the start or past the end is not applied.
    pub fn next_state(&mut self, sink: &mut impl MotionSink, cents: i32) -> bool {
        if self.is_over() {
            return false;
        }

        let mut effective = cents;
        if self.start_time > self.time {
            effective -= self.start_time - self.time;
        }
        if self.end_time != 0 && self.time + cents > self.end_time {
            effective -= self.time + cents - self.end_time;
        }

        self.perform(sink, effective);
        self.time += cents;
        !self.is_over()
    }

    fn perform(&mut self, sink: &mut impl MotionSink, cents: i32) {
        match &mut self.kind {
            MotionKind::PhysicsSelfRotation { torque } => {
                if cents > 0 && sink.has_physics_body(&self.object_id) {
                    sink.physics_command(PhysicsCommand::AddTorque {
                        block_id: self.object_id.clone(),
                        torque: (*torque * cents) as f32,
                    });
                }
                return;
            }
            MotionKind::PhysicsTranslation(law) => {
                if cents > 0 && sink.has_physics_body(&self.object_id) {
                    let mut force = Vector2f::ZERO;
                    for _ in 0..cents {
                        force += law.step() * PHYSICS_TRANSLATION_FORCE;
                    }
                    sink.physics_command(PhysicsCommand::ApplyForce { block_id: self.object_id.clone(), force });
                }
                return;
            }
            _ => {}
        }

        let is_entity = self.kind.is_entity();
        if is_entity {
            match sink.entity_alive(&self.object_id) {
                Some(true) => {}
                Some(false) => return,
                None => {
                    trace!(entity = %self.object_id, "Motion target not found");
                    return;
                }
            }
        }
        if cents <= 0 {
            return;
        }

        let mut sum = Vector2f::ZERO;
        let mut last_angle = 0.0;
        for _ in 0..cents {
            let (v, angle) = self.kind.step();
            sum += v;
            last_angle = angle;
        }

        let id = self.object_id.as_str();
        if is_entity {
            if sum.x != 0.0 || sum.y != 0.0 {
                sink.translate_entity(id, sum.x, sum.y);
            }
            if last_angle != 0.0 {
                sink.rotate_entity(id, last_angle);
            }
        } else {
            if sum.x != 0.0 || sum.y != 0.0 {
                sink.move_block(id, sum.x, sum.y);
            }
            if last_angle != 0.0 {
                if let Some(rotation) = sink.block_rotation(id) {
                    sink.set_block_rotation(id, last_angle + rotation);
                }
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct Recorder {
        alive: BTreeMap<String, bool>,
        positions: BTreeMap<String, Vector2f>,
        angles: BTreeMap<String, f32>,
        physics: Vec<String>,
        commands: Vec<PhysicsCommand>,
    }

    impl MotionSink for Recorder {
        fn entity_alive(&self, id: &str) -> Option<bool> {
            self.alive.get(id).copied()
        }
        fn translate_entity(&mut self, id: &str, dx: f32, dy: f32) {
            *self.positions.entry(id.to_string()).or_default() += Vector2f::new(dx, dy);
        }
        fn rotate_entity(&mut self, id: &str, angle: f32) {
            *self.angles.entry(id.to_string()).or_default() += angle;
        }
        fn block_rotation(&self, id: &str) -> Option<f32> {
            Some(self.angles.get(id).copied().unwrap_or_default())
        }
        fn move_block(&mut self, id: &str, dx: f32, dy: f32) {
            *self.positions.entry(id.to_string()).or_default() += Vector2f::new(dx, dy);
        }
        fn set_block_rotation(&mut self, id: &str, angle: f32) {
            self.angles.insert(id.to_string(), angle);
        }
        fn has_physics_body(&self, id: &str) -> bool {
            self.physics.iter().any(|p| p == id)
        }
        fn physics_command(&mut self, command: PhysicsCommand) {
            self.commands.push(command);
        }
    }

    fn sink_with_entity(id: &str) -> Recorder {
        let mut sink = Recorder::default();
        sink.alive.insert(id.to_string(), true);
        sink
    }

    #[test]
    fn test_translation_goes_back_and_forth() {
        let mut law = TranslationLaw::new(Vector2f::new(1.0, 0.0), 100);
        // 0.02 per cs: out in ~50 cs, back in ~50 cs
        let mut pos = 0.0;
        let mut max: f32 = 0.0;
        for _ in 0..100 {
            pos += law.step().x;
            max = max.max(pos);
        }
        assert!((max - 1.0).abs() < 0.05);
        assert!(pos.abs() < 0.05);
    }

    #[test]
    fn test_zero_period_does_not_move() {
        let mut law = TranslationLaw::new(Vector2f::new(1.0, 1.0), 0);
        assert_eq!(law.step(), Vector2f::ZERO);
        let mut rot = RotationLaw::new(0.0, 1.0, 0);
        assert_eq!(rot.step(), Vector2f::ZERO);
        assert_eq!(SelfRotationLaw::new(0).step(), 0.0);
    }

    #[test]
    fn test_rotation_closes_the_circle() {
        let mut law = RotationLaw::new(0.5, 2.0, 200);
        let mut pos = Vector2f::ZERO;
        // The first step has no displacement, the last one brings it home
        for _ in 0..=200 {
            pos += law.step();
        }
        assert!(pos.length() < 1e-3, "{pos}");
    }

    #[test]
    fn test_self_rotation_corrects_drift() {
        let mut law = SelfRotationLaw::new(7);
        let total: f64 = (0..7).map(|_| law.step() as f64).sum();
        assert!((total - 2.0 * PI).abs() < 1e-5);

        let mut back = SelfRotationLaw::new(-7);
        let total: f64 = (0..7).map(|_| back.step() as f64).sum();
        assert!((total + 2.0 * PI).abs() < 1e-5);
    }

    #[test]
    fn test_window_clips_steps() {
        let mut sink = sink_with_entity("e");
        let mut motion = ScriptMotion::entity_translation("e", 10.0, 0.0, 1000, 5, 15);
        assert!(!motion.is_time_to_move());

        // 10 cs asked, 5 before the start
        assert!(motion.next_state(&mut sink, 10));
        let x = sink.positions["e"].x;
        assert!((x - 5.0 * 0.02).abs() < 1e-5);

        // 10 more, only 5 before the end
        assert!(!motion.next_state(&mut sink, 10));
        let x = sink.positions["e"].x;
        assert!((x - 10.0 * 0.02).abs() < 1e-5);
        assert!(!motion.next_state(&mut sink, 10));
        assert_eq!(motion.time(), 20);
    }

    #[test]
    fn test_dead_entity_does_not_move() {
        let mut sink = sink_with_entity("e");
        sink.alive.insert("e".into(), false);
        let mut motion = ScriptMotion::entity_translation("e", 1.0, 0.0, 100, 0, 0);
        assert!(motion.next_state(&mut sink, 10));
        assert!(sink.positions.is_empty());
        assert_eq!(motion.time(), 10);

        let mut unknown = ScriptMotion::entity_self_rotation("ghost", 100, 0, 0);
        assert!(unknown.next_state(&mut sink, 10));
        assert!(sink.angles.is_empty());
    }

    #[test]
    fn test_block_rotation_accumulates() {
        let mut sink = Recorder::default();
        let mut motion = ScriptMotion::block_self_rotation("b", 400, 0, 0);
        for _ in 0..4 {
            motion.next_state(&mut sink, 1);
        }
        let angle = sink.angles["b"];
        assert!((angle as f64 - 4.0 * 2.0 * PI / 400.0).abs() < 1e-5);
        assert!(sink.positions.is_empty());
    }

    #[test]
    fn test_multi_step_uses_last_angle() {
        let mut sink = sink_with_entity("e");
        let mut motion = ScriptMotion::entity_self_rotation("e", 100, 0, 0);
        motion.next_state(&mut sink, 3);
        let expected = (2.0 * PI / 100.0) as f32;
        assert!((sink.angles["e"] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_physics_commands() {
        let mut sink = Recorder::default();
        sink.physics.push("p".into());

        let mut torque = ScriptMotion::physics_self_rotation("p", 3, 0, 0);
        torque.next_state(&mut sink, 4);
        assert_eq!(sink.commands, vec![PhysicsCommand::AddTorque { block_id: "p".into(), torque: 12.0 }]);

        let mut push = ScriptMotion::physics_translation("p", 0.0, 1.0, 100, 0, 0);
        push.next_state(&mut sink, 1);
        match &sink.commands[1] {
            PhysicsCommand::ApplyForce { force, .. } => assert!((force.y - 0.02 * PHYSICS_TRANSLATION_FORCE).abs() < 1e-2),
            other => panic!("unexpected {other:?}"),
        }

        // No body, no command
        let mut none = ScriptMotion::physics_self_rotation("q", 3, 0, 0);
        none.next_state(&mut sink, 4);
        assert_eq!(sink.commands.len(), 2);
    }
}
