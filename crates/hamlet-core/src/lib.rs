//! Core types and tick pipeline for the hamlet population simulation.

use hamlet_index::{NeighborhoodIndex, UniformGridIndex};
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::{Rng, SeedableRng, rngs::SmallRng};
use rand_distr::Normal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use thiserror::Error;

/// Lowest value a relationship score can take.
pub const SCORE_MIN: i32 = -100;
/// Highest value a relationship score can take.
pub const SCORE_MAX: i32 = 100;
/// Step applied when an encounter reinforces an existing tie.
pub const REINFORCE_STEP: i32 = 10;
/// Score a newborn starts with toward each parent.
pub const PARENT_BOND: i32 = 50;
/// Lower bound of a first-impression draw toward a stranger.
pub const FIRST_IMPRESSION_MIN: i32 = -5;

/// Stable handle for people: a dense, append-order index that is never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct PersonId(pub u32);

impl PersonId {
    /// Dense position of this person in the arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// High level simulation clock (ticks processed since boot).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the tick counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Gender tag fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Female,
    Male,
    Other,
}

impl Gender {
    /// Sample a gender with the fixed 0.45/0.45/0.10 weights.
    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let u: f64 = rng.random();
        if u < 0.45 {
            Self::Female
        } else if u < 0.90 {
            Self::Male
        } else {
            Self::Other
        }
    }
}

/// Occupations assignable after puberty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Job {
    Farmer,
    Inventor,
    Artist,
    Leader,
    Learner,
    Warrior,
    Merchant,
}

/// Five-trait OCEAN personality vector, each component in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Personality {
    pub openness: f64,
    pub conscientiousness: f64,
    pub extraversion: f64,
    pub agreeableness: f64,
    pub neuroticism: f64,
}

impl Default for Personality {
    fn default() -> Self {
        Self {
            openness: 0.5,
            conscientiousness: 0.5,
            extraversion: 0.5,
            agreeableness: 0.5,
            neuroticism: 0.5,
        }
    }
}

impl Personality {
    /// Sample each trait independently from `Uniform(0, 1)`.
    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            openness: rng.random(),
            conscientiousness: rng.random(),
            extraversion: rng.random(),
            agreeableness: rng.random(),
            neuroticism: rng.random(),
        }
    }

    /// Trait-wise arithmetic mean of two parents. No mutation term.
    #[must_use]
    pub fn blend(a: Self, b: Self) -> Self {
        Self {
            openness: (a.openness + b.openness) / 2.0,
            conscientiousness: (a.conscientiousness + b.conscientiousness) / 2.0,
            extraversion: (a.extraversion + b.extraversion) / 2.0,
            agreeableness: (a.agreeableness + b.agreeableness) / 2.0,
            neuroticism: (a.neuroticism + b.neuroticism) / 2.0,
        }
    }
}

/// Axis-aligned 2D position.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    /// Construct a new position.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A single inhabitant. Records persist forever; death only flips `alive`.
#[derive(Debug, Clone)]
pub struct Person {
    pub id: PersonId,
    /// Source of truth for age. Seed people get negative values so their
    /// configured starting age holds at tick 0.
    pub birth_tick: i64,
    /// Set exactly once, on death; freezes the derived age.
    pub died_at: Option<Tick>,
    pub gender: Gender,
    pub alive: bool,
    pub pubescent: bool,
    /// `(mother, father)`; `None` for seed people.
    pub parents: Option<(PersonId, PersonId)>,
    pub children: Vec<PersonId>,
    pub spouse: Option<PersonId>,
    pub job: Option<Job>,
    pub position: Position,
    pub personality: Personality,
    /// Signed sentiment toward other people, each in `[SCORE_MIN, SCORE_MAX]`.
    pub ties: HashMap<PersonId, i32>,
}

impl Person {
    /// Age in ticks at `now`, frozen at the moment of death.
    #[must_use]
    pub fn age(&self, now: Tick) -> u32 {
        let reference = self.died_at.map_or(now.0 as i64, |died| died.0 as i64);
        (reference - self.birth_tick).max(0) as u32
    }

    /// Current sentiment toward `other`, defaulting to 0 when no tie exists.
    #[must_use]
    pub fn tie(&self, other: PersonId) -> i32 {
        self.ties.get(&other).copied().unwrap_or(0)
    }
}

/// Scalar fields supplied when inserting a new person into the arena.
#[derive(Debug, Clone, Copy)]
pub struct PersonSeed {
    pub birth_tick: i64,
    pub gender: Gender,
    pub pubescent: bool,
    pub position: Position,
    pub personality: Personality,
    pub parents: Option<(PersonId, PersonId)>,
}

impl Default for PersonSeed {
    fn default() -> Self {
        Self {
            birth_tick: 0,
            gender: Gender::Female,
            pubescent: false,
            position: Position::default(),
            personality: Personality::default(),
            parents: None,
        }
    }
}

/// Append-only arena of people. Ids are dense indices in creation order.
#[derive(Debug, Default)]
pub struct People {
    entries: Vec<Person>,
}

impl People {
    /// Create an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of people ever created.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nobody has been created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of people currently alive.
    #[must_use]
    pub fn living_count(&self) -> usize {
        self.entries.iter().filter(|p| p.alive).count()
    }

    /// Append a new person, returning its handle.
    pub fn spawn(&mut self, seed: PersonSeed) -> PersonId {
        let id = PersonId(self.entries.len() as u32);
        self.entries.push(Person {
            id,
            birth_tick: seed.birth_tick,
            died_at: None,
            gender: seed.gender,
            alive: true,
            pubescent: seed.pubescent,
            parents: seed.parents,
            children: Vec::new(),
            spouse: None,
            job: None,
            position: seed.position,
            personality: seed.personality,
            ties: HashMap::new(),
        });
        id
    }

    /// Look up a person by id.
    pub fn get(&self, id: PersonId) -> Result<&Person, SimulationError> {
        self.entries
            .get(id.index())
            .ok_or(SimulationError::PersonNotFound(id))
    }

    /// Iterate everyone in creation order.
    pub fn all(&self) -> impl Iterator<Item = &Person> {
        self.entries.iter()
    }

    /// Iterate the living in creation order.
    pub fn living(&self) -> impl Iterator<Item = &Person> {
        self.entries.iter().filter(|p| p.alive)
    }

    /// Read-only slice of the id range `[start, end)`, clamped to the arena.
    #[must_use]
    pub fn range(&self, start: usize, end: usize) -> &[Person] {
        let len = self.entries.len();
        let start = start.min(len);
        let end = end.clamp(start, len);
        &self.entries[start..end]
    }

    fn entry(&self, idx: usize) -> &Person {
        &self.entries[idx]
    }

    fn entry_mut(&mut self, idx: usize) -> &mut Person {
        &mut self.entries[idx]
    }
}

/// Errors raised by simulation construction and queries.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SimulationError {
    /// Indicates an invalid configuration value; fatal to the instance.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Query for an id outside the arena.
    #[error("no person with id {0}")]
    PersonNotFound(PersonId),
}

/// Event categories tracked per tick by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Births,
    Deaths,
    Pubescences,
    Marriages,
    Interactions,
}

impl EventKind {
    /// All categories, in ledger column order.
    pub const ALL: [Self; 5] = [
        Self::Births,
        Self::Deaths,
        Self::Pubescences,
        Self::Marriages,
        Self::Interactions,
    ];
}

/// Append-only per-tick event count series, consumed by external charting.
///
/// Serializes as a named mapping from category to its ordered series.
#[derive(Debug, Default, Clone, Serialize)]
pub struct EventLedger {
    births: Vec<u64>,
    deaths: Vec<u64>,
    pubescences: Vec<u64>,
    marriages: Vec<u64>,
    interactions: Vec<u64>,
}

impl EventLedger {
    /// Open a fresh zeroed row for the next tick in every category.
    pub fn begin_tick(&mut self) {
        self.births.push(0);
        self.deaths.push(0);
        self.pubescences.push(0);
        self.marriages.push(0);
        self.interactions.push(0);
    }

    /// Increment the current tick's count for `kind`.
    pub fn record(&mut self, kind: EventKind) {
        if let Some(cell) = self.column_mut(kind).last_mut() {
            *cell += 1;
        }
    }

    /// Count recorded for `kind` in the tick currently being built.
    #[must_use]
    pub fn tally(&self, kind: EventKind) -> u64 {
        self.column(kind).last().copied().unwrap_or(0)
    }

    /// The full per-tick series for `kind`.
    #[must_use]
    pub fn series(&self, kind: EventKind) -> &[u64] {
        self.column(kind)
    }

    /// Number of ticks recorded so far.
    #[must_use]
    pub fn ticks(&self) -> usize {
        self.births.len()
    }

    fn column(&self, kind: EventKind) -> &Vec<u64> {
        match kind {
            EventKind::Births => &self.births,
            EventKind::Deaths => &self.deaths,
            EventKind::Pubescences => &self.pubescences,
            EventKind::Marriages => &self.marriages,
            EventKind::Interactions => &self.interactions,
        }
    }

    fn column_mut(&mut self, kind: EventKind) -> &mut Vec<u64> {
        match kind {
            EventKind::Births => &mut self.births,
            EventKind::Deaths => &mut self.deaths,
            EventKind::Pubescences => &mut self.pubescences,
            EventKind::Marriages => &mut self.marriages,
            EventKind::Interactions => &mut self.interactions,
        }
    }
}

/// Per-tick summary returned by the tick driver and retained in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub tick: Tick,
    pub births: u64,
    pub deaths: u64,
    pub pubescences: u64,
    pub marriages: u64,
    pub interactions: u64,
    /// Post-tick living population size.
    pub living: usize,
}

/// Reporting sink invoked after each completed tick.
pub trait ReportSink: Send {
    fn on_tick(&mut self, report: &TickReport);
}

/// No-op reporting sink.
#[derive(Debug, Default)]
pub struct NullSink;

impl ReportSink for NullSink {
    fn on_tick(&mut self, _report: &TickReport) {}
}

/// Static configuration for a hamlet simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HamletConfig {
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
    /// Seed population count drawn from `[seed_count_min, seed_count_max)`.
    pub seed_count_min: u32,
    pub seed_count_max: u32,
    /// Seed starting ages drawn from `[seed_age_min, seed_age_max)`.
    pub seed_age_min: u32,
    pub seed_age_max: u32,
    /// Legacy life-expectancy draw range. Validated but not consumed by the
    /// age-only mortality hazard.
    pub life_expectancy_min: u32,
    pub life_expectancy_max: u32,
    /// Chance a living married woman gives birth in a tick.
    pub birth_probability: f64,
    /// Gompertz hazard `a` coefficient.
    pub mortality_coefficient: f64,
    /// Gompertz hazard `b` exponent per year of age.
    pub mortality_exponent: f64,
    /// Per-gender puberty onset means (ticks of age).
    pub puberty_mean_female: f64,
    pub puberty_mean_male: f64,
    pub puberty_mean_other: f64,
    pub puberty_sigma: f64,
    /// Chance an eligible woman attempts a match in a tick.
    pub marriage_probability: f64,
    /// Rejection-sampling draw budget for partner search.
    pub marriage_search_limit: u32,
    /// Occupation table sampled via weighted choice.
    pub job_weights: Vec<(Job, f64)>,
    /// Seed positions are uniform in `[0, world_extent)` per axis.
    pub world_extent: f32,
    /// Brownian sub-steps per tick.
    pub motion_steps: u32,
    pub motion_dt: f64,
    pub motion_delta: f64,
    /// Pair distance below which an encounter fires.
    pub interaction_radius: f32,
    /// Maximum number of recent tick reports retained in memory.
    pub history_capacity: usize,
}

/// Default occupation weights; farming dominates.
#[must_use]
pub fn default_job_weights() -> Vec<(Job, f64)> {
    vec![
        (Job::Farmer, 0.5),
        (Job::Inventor, 0.1),
        (Job::Artist, 0.1),
        (Job::Learner, 0.1),
        (Job::Leader, 0.1),
        (Job::Warrior, 0.1),
        (Job::Merchant, 0.1),
    ]
}

impl Default for HamletConfig {
    fn default() -> Self {
        Self {
            rng_seed: None,
            seed_count_min: 15,
            seed_count_max: 40,
            seed_age_min: 15,
            seed_age_max: 35,
            life_expectancy_min: 45,
            life_expectancy_max: 60,
            birth_probability: 0.7,
            mortality_coefficient: 0.0005,
            mortality_exponent: 0.085,
            puberty_mean_female: 10.0,
            puberty_mean_male: 12.0,
            puberty_mean_other: 11.0,
            puberty_sigma: 1.5,
            marriage_probability: 0.3,
            marriage_search_limit: 256,
            job_weights: default_job_weights(),
            world_extent: 100.0,
            motion_steps: 100,
            motion_dt: 0.01,
            motion_delta: 0.5,
            interaction_radius: 1.0,
            history_capacity: 256,
        }
    }
}

impl HamletConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.seed_count_max <= self.seed_count_min {
            return Err(SimulationError::InvalidConfig(
                "seed_count_max must exceed seed_count_min",
            ));
        }
        if self.seed_age_max <= self.seed_age_min {
            return Err(SimulationError::InvalidConfig(
                "seed_age_max must exceed seed_age_min",
            ));
        }
        if self.life_expectancy_max <= self.life_expectancy_min {
            return Err(SimulationError::InvalidConfig(
                "life_expectancy_max must exceed life_expectancy_min",
            ));
        }
        if !(0.0..=1.0).contains(&self.birth_probability) {
            return Err(SimulationError::InvalidConfig(
                "birth_probability must be within [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.marriage_probability) {
            return Err(SimulationError::InvalidConfig(
                "marriage_probability must be within [0, 1]",
            ));
        }
        if self.mortality_coefficient < 0.0 || !self.mortality_coefficient.is_finite() {
            return Err(SimulationError::InvalidConfig(
                "mortality_coefficient must be non-negative",
            ));
        }
        if !self.mortality_exponent.is_finite() {
            return Err(SimulationError::InvalidConfig(
                "mortality_exponent must be finite",
            ));
        }
        if self.puberty_sigma <= 0.0 || !self.puberty_sigma.is_finite() {
            return Err(SimulationError::InvalidConfig(
                "puberty_sigma must be positive",
            ));
        }
        if self.marriage_search_limit == 0 {
            return Err(SimulationError::InvalidConfig(
                "marriage_search_limit must be positive",
            ));
        }
        if self.job_weights.is_empty() {
            return Err(SimulationError::InvalidConfig(
                "job_weights must not be empty",
            ));
        }
        if self
            .job_weights
            .iter()
            .any(|(_, w)| *w < 0.0 || !w.is_finite())
        {
            return Err(SimulationError::InvalidConfig(
                "job weights must be non-negative and finite",
            ));
        }
        if self.job_weights.iter().map(|(_, w)| *w).sum::<f64>() <= 0.0 {
            return Err(SimulationError::InvalidConfig(
                "job weights must sum above zero",
            ));
        }
        if self.world_extent <= 0.0 || !self.world_extent.is_finite() {
            return Err(SimulationError::InvalidConfig(
                "world_extent must be positive",
            ));
        }
        if self.motion_steps == 0 {
            return Err(SimulationError::InvalidConfig(
                "motion_steps must be positive",
            ));
        }
        if self.motion_dt <= 0.0 || !self.motion_dt.is_finite() {
            return Err(SimulationError::InvalidConfig("motion_dt must be positive"));
        }
        if self.motion_delta <= 0.0 || !self.motion_delta.is_finite() {
            return Err(SimulationError::InvalidConfig(
                "motion_delta must be positive",
            ));
        }
        if self.interaction_radius <= 0.0 || !self.interaction_radius.is_finite() {
            return Err(SimulationError::InvalidConfig(
                "interaction_radius must be positive",
            ));
        }
        if self.history_capacity == 0 {
            return Err(SimulationError::InvalidConfig(
                "history_capacity must be positive",
            ));
        }
        Ok(())
    }

    /// Closed lookup of the puberty onset mean for a gender.
    #[must_use]
    pub fn puberty_mean(&self, gender: Gender) -> f64 {
        match gender {
            Gender::Female => self.puberty_mean_female,
            Gender::Male => self.puberty_mean_male,
            Gender::Other => self.puberty_mean_other,
        }
    }

    /// Standard deviation of one Brownian sub-step per axis.
    #[must_use]
    pub fn motion_sigma(&self) -> f64 {
        self.motion_delta * self.motion_dt.sqrt()
    }

    /// Returns the configured RNG, seeding from entropy when no seed is set.
    fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}

/// Gaussian density, used directly as a per-tick Bernoulli probability by
/// the puberty stage. Not a normalized probability; near the mean it sits
/// around 0.27 for sigma 1.5.
fn gaussian_density(x: f64, mean: f64, sigma: f64) -> f64 {
    let z = (x - mean) / sigma;
    (-0.5 * z * z).exp() / (sigma * (2.0 * std::f64::consts::PI).sqrt())
}

/// A closed population advanced tick by tick.
///
/// Every instance owns freshly allocated containers and its own RNG; nothing
/// is shared between instances.
pub struct Simulation {
    config: HamletConfig,
    tick: Tick,
    rng: SmallRng,
    people: People,
    index: UniformGridIndex,
    ledger: EventLedger,
    job_table: Vec<Job>,
    job_sampler: WeightedIndex<f64>,
    step_noise: Normal<f32>,
    history: VecDeque<TickReport>,
    sink: Box<dyn ReportSink>,
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("config", &self.config)
            .field("tick", &self.tick)
            .field("people", &self.people.len())
            .field("living", &self.people.living_count())
            .finish()
    }
}

impl Simulation {
    /// Instantiate with a randomized seed population drawn from the config.
    pub fn new(config: HamletConfig) -> Result<Self, SimulationError> {
        let mut sim = Self::empty(config)?;
        sim.seed_population();
        Ok(sim)
    }

    /// Instantiate with no inhabitants; callers spawn people explicitly.
    pub fn empty(config: HamletConfig) -> Result<Self, SimulationError> {
        Self::with_sink(config, Box::new(NullSink))
    }

    /// Instantiate with a reporting sink invoked after every tick.
    pub fn with_sink(
        config: HamletConfig,
        sink: Box<dyn ReportSink>,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        let rng = config.seeded_rng();
        let job_table: Vec<Job> = config.job_weights.iter().map(|(job, _)| *job).collect();
        let job_sampler = WeightedIndex::new(config.job_weights.iter().map(|(_, w)| *w))
            .map_err(|_| SimulationError::InvalidConfig("job weights must form a distribution"))?;
        let step_noise = Normal::new(0.0_f32, config.motion_sigma() as f32)
            .map_err(|_| SimulationError::InvalidConfig("motion parameters must be finite"))?;
        let index = UniformGridIndex::new(config.interaction_radius);
        let history_capacity = config.history_capacity;
        Ok(Self {
            config,
            tick: Tick::zero(),
            rng,
            people: People::new(),
            index,
            ledger: EventLedger::default(),
            job_table,
            job_sampler,
            step_noise,
            history: VecDeque::with_capacity(history_capacity),
            sink,
        })
    }

    fn seed_population(&mut self) {
        let count = self
            .rng
            .random_range(self.config.seed_count_min..self.config.seed_count_max);
        for _ in 0..count {
            let age = self
                .rng
                .random_range(self.config.seed_age_min..self.config.seed_age_max);
            let gender = Gender::sample(&mut self.rng);
            let position = Position::new(
                self.rng.random_range(0.0..self.config.world_extent),
                self.rng.random_range(0.0..self.config.world_extent),
            );
            let personality = Personality::sample(&mut self.rng);
            self.people.spawn(PersonSeed {
                birth_tick: -i64::from(age),
                gender,
                pubescent: true,
                position,
                personality,
                parents: None,
            });
        }
    }

    /// Append a person to the arena, returning its handle.
    pub fn spawn_person(&mut self, seed: PersonSeed) -> PersonId {
        self.people.spawn(seed)
    }

    /// Execute one full tick: demographic stages over the tick-start
    /// snapshot, then the spatial sub-step loop, then ledger finalization.
    pub fn advance_tick(&mut self) -> TickReport {
        let snapshot = self.people.len();
        self.ledger.begin_tick();
        self.stage_births(snapshot);
        self.stage_mortality(snapshot);
        self.stage_puberty(snapshot);
        self.stage_marriages(snapshot);
        self.stage_occupations(snapshot);
        self.stage_motion();
        self.finalize_tick()
    }

    /// Birth stage: each living woman with a living spouse may bear a child.
    /// Children are appended past the snapshot and sit out the rest of the tick.
    fn stage_births(&mut self, snapshot: usize) {
        for idx in 0..snapshot {
            let (eligible, spouse) = {
                let mother = self.people.entry(idx);
                (
                    mother.alive && mother.gender == Gender::Female && mother.spouse.is_some(),
                    mother.spouse,
                )
            };
            if !eligible {
                continue;
            }
            let Some(father_id) = spouse else {
                continue;
            };
            let (father_alive, father_personality) = {
                let father = self.people.entry(father_id.index());
                (father.alive, father.personality)
            };
            if !father_alive {
                continue;
            }
            if self.rng.random::<f64>() >= self.config.birth_probability {
                continue;
            }

            let mother_id = PersonId(idx as u32);
            let (mother_position, mother_personality) = {
                let mother = self.people.entry(idx);
                (mother.position, mother.personality)
            };
            let gender = Gender::sample(&mut self.rng);
            let child = self.people.spawn(PersonSeed {
                birth_tick: self.tick.0 as i64,
                gender,
                pubescent: false,
                position: mother_position,
                personality: Personality::blend(mother_personality, father_personality),
                parents: Some((mother_id, father_id)),
            });
            {
                let newborn = self.people.entry_mut(child.index());
                newborn.ties.insert(mother_id, PARENT_BOND);
                newborn.ties.insert(father_id, PARENT_BOND);
            }
            self.people.entry_mut(idx).children.push(child);
            self.people.entry_mut(father_id.index()).children.push(child);
            self.ledger.record(EventKind::Births);
        }
    }

    /// Mortality stage: Gompertz hazard per living person. Survivors age
    /// implicitly through `birth_tick`; the dead keep their final age.
    fn stage_mortality(&mut self, snapshot: usize) {
        let a = self.config.mortality_coefficient;
        let b = self.config.mortality_exponent;
        for idx in 0..snapshot {
            let (alive, age) = {
                let person = self.people.entry(idx);
                (person.alive, person.age(self.tick))
            };
            if !alive {
                continue;
            }
            let hazard = a * (b * f64::from(age)).exp();
            if self.rng.random::<f64>() <= hazard {
                let person = self.people.entry_mut(idx);
                person.alive = false;
                person.died_at = Some(self.tick);
                self.ledger.record(EventKind::Deaths);
            }
        }
    }

    /// Puberty stage. Liveness is deliberately not checked here; a dead
    /// child's frozen age bounds the draws.
    fn stage_puberty(&mut self, snapshot: usize) {
        let sigma = self.config.puberty_sigma;
        for idx in 0..snapshot {
            let (pubescent, age, gender) = {
                let person = self.people.entry(idx);
                (person.pubescent, person.age(self.tick), person.gender)
            };
            if pubescent {
                continue;
            }
            let density = gaussian_density(f64::from(age), self.config.puberty_mean(gender), sigma);
            if self.rng.random::<f64>() <= density {
                self.people.entry_mut(idx).pubescent = true;
                self.ledger.record(EventKind::Pubescences);
            }
        }
    }

    /// Marriage stage: eligible women attempt a bounded random partner search.
    fn stage_marriages(&mut self, snapshot: usize) {
        for idx in 0..snapshot {
            let eligible = {
                let person = self.people.entry(idx);
                person.alive
                    && person.pubescent
                    && person.spouse.is_none()
                    && person.gender == Gender::Female
            };
            if !eligible {
                continue;
            }
            if self.rng.random::<f64>() > self.config.marriage_probability {
                continue;
            }
            if let Some(partner) = self.find_eligible_partner(snapshot) {
                let bride = PersonId(idx as u32);
                self.people.entry_mut(idx).spouse = Some(partner);
                self.people.entry_mut(partner.index()).spouse = Some(bride);
                self.ledger.record(EventKind::Marriages);
            }
        }
    }

    /// Rejection-sample an eligible man from the first `pool` people.
    ///
    /// Exhausting the draw budget is an ordinary no-match outcome.
    fn find_eligible_partner(&mut self, pool: usize) -> Option<PersonId> {
        if pool == 0 {
            return None;
        }
        for _ in 0..self.config.marriage_search_limit {
            let idx = self.rng.random_range(0..pool);
            let candidate = self.people.entry(idx);
            if candidate.alive
                && candidate.pubescent
                && candidate.spouse.is_none()
                && candidate.gender == Gender::Male
            {
                return Some(PersonId(idx as u32));
            }
        }
        None
    }

    /// Occupation stage: every living, pubescent, jobless person receives a
    /// weighted-random job. Ineligible people are skipped individually.
    fn stage_occupations(&mut self, snapshot: usize) {
        for idx in 0..snapshot {
            let eligible = {
                let person = self.people.entry(idx);
                person.alive && person.pubescent && person.job.is_none()
            };
            if !eligible {
                continue;
            }
            let job = self.job_table[self.job_sampler.sample(&mut self.rng)];
            self.people.entry_mut(idx).job = Some(job);
        }
    }

    /// Spatial stage: Brownian sub-steps with proximity-triggered encounters.
    ///
    /// Everyone moves and is indexed, dead included; liveness is filtered
    /// at the encounter trigger.
    fn stage_motion(&mut self) {
        let count = self.people.len();
        if count == 0 {
            return;
        }
        let radius = self.config.interaction_radius;
        let radius_sq = radius * radius;
        let mut pairs: Vec<(usize, usize)> = Vec::new();

        for _ in 0..self.config.motion_steps {
            for idx in 0..count {
                let dx = self.step_noise.sample(&mut self.rng);
                let dy = self.step_noise.sample(&mut self.rng);
                let person = self.people.entry_mut(idx);
                person.position.x += dx;
                person.position.y += dy;
            }

            let positions: Vec<(f32, f32)> = self
                .people
                .all()
                .map(|p| (p.position.x, p.position.y))
                .collect();
            if self.index.rebuild(&positions).is_err() {
                return;
            }

            pairs.clear();
            self.index
                .pairs_within(radius_sq, &mut |a, b, _| pairs.push((a, b)));

            for &(a, b) in &pairs {
                if !(self.people.entry(a).alive && self.people.entry(b).alive) {
                    continue;
                }
                self.ledger.record(EventKind::Interactions);
                self.encounter(a, b);
                self.encounter(b, a);
            }
        }
    }

    /// One directed encounter: `actor` reacts to being near `other`.
    fn encounter(&mut self, actor: usize, other: usize) {
        let gate: f64 = self.rng.random();
        if gate >= self.people.entry(actor).personality.extraversion {
            return;
        }
        let actor_id = PersonId(actor as u32);
        let other_id = PersonId(other as u32);
        let prior = self.people.entry(actor).ties.get(&other_id).copied();
        match prior {
            Some(score) if score < 0 => {
                Self::shift_tie(self.people.entry_mut(actor), other_id, -REINFORCE_STEP);
                Self::shift_tie(self.people.entry_mut(other), actor_id, -REINFORCE_STEP);
            }
            Some(score) if score > 0 => {
                Self::shift_tie(self.people.entry_mut(actor), other_id, REINFORCE_STEP);
                Self::shift_tie(self.people.entry_mut(other), actor_id, REINFORCE_STEP);
            }
            // An exactly-zero tie never moves again through reinforcement.
            Some(_) => {}
            None => {
                // Asymmetric first impressions: the actor's draw scales with
                // agreeableness, the other side jitters around its prior.
                let upper = (10.0 * self.people.entry(actor).personality.agreeableness) as i32;
                let first = self.rng.random_range(FIRST_IMPRESSION_MIN..upper.max(0));
                self.people.entry_mut(actor).ties.insert(other_id, first);

                let prior_back = self.people.entry(other).ties.get(&actor_id).copied();
                let jitter = self.rng.random_range(-REINFORCE_STEP..=REINFORCE_STEP);
                let back = (prior_back.unwrap_or(0) + jitter).clamp(SCORE_MIN, SCORE_MAX);
                self.people.entry_mut(other).ties.insert(actor_id, back);
            }
        }
    }

    fn shift_tie(person: &mut Person, toward: PersonId, delta: i32) {
        let entry = person.ties.entry(toward).or_insert(0);
        *entry = (*entry + delta).clamp(SCORE_MIN, SCORE_MAX);
    }

    fn finalize_tick(&mut self) -> TickReport {
        let report = TickReport {
            tick: self.tick,
            births: self.ledger.tally(EventKind::Births),
            deaths: self.ledger.tally(EventKind::Deaths),
            pubescences: self.ledger.tally(EventKind::Pubescences),
            marriages: self.ledger.tally(EventKind::Marriages),
            interactions: self.ledger.tally(EventKind::Interactions),
            living: self.people.living_count(),
        };
        if self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(report);
        self.sink.on_tick(&report);
        self.tick = self.tick.next();
        report
    }

    /// Returns an immutable reference to configuration.
    #[must_use]
    pub fn config(&self) -> &HamletConfig {
        &self.config
    }

    /// Current simulation tick (the next one to be processed).
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Read-only access to the population arena.
    #[must_use]
    pub fn people(&self) -> &People {
        &self.people
    }

    /// Number of people currently alive.
    #[must_use]
    pub fn living_count(&self) -> usize {
        self.people.living_count()
    }

    /// Look up a person by id.
    pub fn person(&self, id: PersonId) -> Result<&Person, SimulationError> {
        self.people.get(id)
    }

    /// Read-only slice of people with ids in `[start, end)`, clamped.
    #[must_use]
    pub fn people_in_range(&self, start: usize, end: usize) -> &[Person] {
        self.people.range(start, end)
    }

    /// Current sentiment of `a` toward `b`, default 0.
    #[must_use]
    pub fn relationship_score(&self, a: PersonId, b: PersonId) -> i32 {
        self.people
            .get(a)
            .map(|person| person.tie(b))
            .unwrap_or(0)
    }

    /// The append-only event series for external reporting.
    #[must_use]
    pub fn ledger(&self) -> &EventLedger {
        &self.ledger
    }

    /// Iterate over retained tick reports, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &TickReport> {
        self.history.iter()
    }

    /// Replace the reporting sink.
    pub fn set_sink(&mut self, sink: Box<dyn ReportSink>) {
        self.sink = sink;
    }
}
