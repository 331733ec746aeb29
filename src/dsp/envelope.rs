//! ADSR Envelope generator.

/// Envelope stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// ADSR Envelope with linear attack/decay/release ramps.
///
/// Stage times and the sustain level are latched when a stage is entered,
/// so [`Envelope::update`] never stretches a ramp that is already running.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Attack time in seconds.
    attack: f64,
    /// Decay time in seconds.
    decay: f64,
    /// Sustain level [0, 1].
    sustain: f64,
    /// Release time in seconds.
    release: f64,

    stage: Stage,
    level: f64,
    sample_rate: f64,
    /// Length of the current stage in samples.
    stage_samples: usize,
    stage_counter: usize,
    /// Level at the start of the current stage.
    start_level: f64,
    /// Level the current stage ramps towards (sustain level for Decay/Sustain).
    target_level: f64,
}

impl Envelope {
    pub fn new(sample_rate: f64) -> Self {
        Envelope {
            attack: 0.1,
            decay: 0.1,
            sustain: 1.0,
            release: 0.4,
            stage: Stage::Idle,
            level: 0.0,
            sample_rate,
            stage_samples: 0,
            stage_counter: 0,
            start_level: 0.0,
            target_level: 0.0,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    /// Rewrite the stage parameters. Takes effect on the next stage entry.
    pub fn update(&mut self, attack: f64, decay: f64, sustain: f64, release: f64) {
        self.attack = attack.max(0.0);
        self.decay = decay.max(0.0);
        self.sustain = sustain.clamp(0.0, 1.0);
        self.release = release.max(0.0);
    }

    /// Trigger the envelope (note on). Ramps up from the current level.
    pub fn trigger(&mut self) {
        self.stage = Stage::Attack;
        self.stage_samples = self.seconds_to_samples(self.attack);
        self.stage_counter = 0;
        self.start_level = self.level;
        self.target_level = 1.0;
    }

    /// Release the envelope (note off). No-op when idle or already releasing;
    /// releasing from silence goes straight to idle.
    pub fn release(&mut self) {
        if matches!(self.stage, Stage::Idle | Stage::Release) {
            return;
        }
        if self.level <= 0.0 {
            self.reset();
            return;
        }
        self.stage = Stage::Release;
        self.stage_samples = self.seconds_to_samples(self.release);
        self.stage_counter = 0;
        self.start_level = self.level;
        self.target_level = 0.0;
    }

    /// Drop straight to silence without a release ramp.
    pub fn reset(&mut self) {
        self.stage = Stage::Idle;
        self.level = 0.0;
        self.stage_samples = 0;
        self.stage_counter = 0;
        self.start_level = 0.0;
        self.target_level = 0.0;
    }

    /// Advance one sample and return the envelope level [0, 1].
    pub fn advance(&mut self) -> f64 {
        match self.stage {
            Stage::Idle => {
                self.level = 0.0;
            }
            Stage::Attack => {
                if self.ramp() {
                    self.enter_decay();
                }
            }
            Stage::Decay => {
                if self.ramp() {
                    self.stage = Stage::Sustain;
                }
            }
            Stage::Sustain => {
                self.level = self.target_level;
            }
            Stage::Release => {
                if self.ramp() {
                    self.stage = Stage::Idle;
                }
            }
        }
        self.level
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    /// Returns true if the envelope has finished (idle after release).
    pub fn is_idle(&self) -> bool {
        self.stage == Stage::Idle
    }

    /// Step the linear ramp of the current stage. Returns true once the
    /// target is reached; zero-length stages complete on the first sample.
    fn ramp(&mut self) -> bool {
        self.stage_counter += 1;
        if self.stage_counter >= self.stage_samples {
            self.level = self.target_level;
            return true;
        }
        let t = self.stage_counter as f64 / self.stage_samples as f64;
        self.level = (self.start_level + (self.target_level - self.start_level) * t).clamp(0.0, 1.0);
        false
    }

    fn enter_decay(&mut self) {
        self.stage = Stage::Decay;
        self.stage_samples = self.seconds_to_samples(self.decay);
        self.stage_counter = 0;
        self.start_level = self.level;
        self.target_level = self.sustain;
    }

    fn seconds_to_samples(&self, seconds: f64) -> usize {
        (seconds * self.sample_rate).round().max(0.0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_env(sustain: f64) -> Envelope {
        let mut env = Envelope::new(44100.0);
        env.update(0.001, 0.001, sustain, 0.01);
        env
    }

    #[test]
    fn starts_idle() {
        let env = Envelope::new(44100.0);
        assert!(env.is_idle());
        assert_eq!(env.level(), 0.0);
    }

    #[test]
    fn attack_reaches_one() {
        let mut env = Envelope::new(44100.0);
        env.update(0.01, 0.1, 0.5, 0.1); // 441 samples of attack
        env.trigger();

        let mut max_level = 0.0;
        for _ in 0..500 {
            let s = env.advance();
            if s > max_level {
                max_level = s;
            }
        }
        assert!(
            (max_level - 1.0).abs() < 1e-9,
            "Attack should reach 1.0, got {max_level}"
        );
    }

    #[test]
    fn sustain_holds() {
        let mut env = fast_env(0.6);
        env.trigger();

        for _ in 0..500 {
            env.advance();
        }

        assert_eq!(env.stage(), Stage::Sustain);
        let s = env.advance();
        assert!((s - 0.6).abs() < 1e-9, "Should sustain at 0.6, got {s}");
    }

    #[test]
    fn release_to_zero() {
        let mut env = fast_env(0.7);
        env.trigger();
        for _ in 0..500 {
            env.advance();
        }

        env.release();
        assert_eq!(env.stage(), Stage::Release);
        for _ in 0..1000 {
            env.advance();
        }

        assert!(env.is_idle(), "Should be idle after release");
        assert!(env.level().abs() < 1e-9, "Level should be 0 after release");
    }

    #[test]
    fn zero_length_stages_do_not_produce_nan() {
        let mut env = Envelope::new(44100.0);
        env.update(0.0, 0.0, 0.5, 0.0);
        env.trigger();

        let first = env.advance();
        assert_eq!(first, 1.0, "zero attack should jump to peak");
        let second = env.advance();
        assert_eq!(second, 0.5, "zero decay should land on sustain");

        env.release();
        let released = env.advance();
        assert_eq!(released, 0.0);
        assert!(env.is_idle());
    }

    #[test]
    fn release_during_attack_starts_from_current_level() {
        let mut env = Envelope::new(44100.0);
        env.update(0.1, 0.1, 1.0, 0.1);
        env.trigger();
        for _ in 0..2205 {
            env.advance();
        }
        let before = env.level();
        assert!(before > 0.4 && before < 0.6, "halfway through attack, got {before}");

        env.release();
        let after = env.advance();
        assert!(after <= before && before - after < 1e-3, "release jumped from {before} to {after}");
    }

    #[test]
    fn retrigger_mid_release_is_continuous() {
        let mut env = Envelope::new(44100.0);
        env.update(0.05, 0.05, 0.8, 0.5);
        env.trigger();
        for _ in 0..10_000 {
            env.advance();
        }
        env.release();
        for _ in 0..5_000 {
            env.advance();
        }
        let before = env.level();
        assert!(before > 0.0);

        env.trigger();
        let after = env.advance();
        assert!(after >= before, "retrigger should ramp up from {before}, got {after}");
        assert!(after - before < 1e-3, "retrigger jumped from {before} to {after}");
    }

    #[test]
    fn update_does_not_stretch_running_stage() {
        let mut env = Envelope::new(1000.0);
        env.update(0.1, 0.1, 0.5, 0.1); // 100 samples of attack
        env.trigger();
        for _ in 0..50 {
            env.advance();
        }
        env.update(1.0, 0.1, 0.5, 0.1);
        for _ in 0..50 {
            env.advance();
        }
        assert_eq!(env.stage(), Stage::Decay, "attack should finish on its original schedule");
    }

    #[test]
    fn full_cycle_stays_in_range_and_continuous() {
        let mut env = Envelope::new(44100.0);
        env.update(0.01, 0.05, 0.5, 0.1);
        env.trigger();

        // Steepest ramp is the attack: 1.0 over 441 samples.
        let max_step = 1.0 / 441.0 + 1e-9;
        let mut prev = 0.0;
        for i in 0..20_000 {
            if i == 10_000 {
                env.release();
            }
            let s = env.advance();
            assert!((0.0..=1.0).contains(&s), "Envelope out of range: {s}");
            assert!((s - prev).abs() <= max_step, "Discontinuity at {i}: {prev} -> {s}");
            prev = s;
        }

        assert!(env.is_idle());
    }
}
