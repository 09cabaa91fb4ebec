//! Algorithm and application configuration.
//!
//! `AlgorithmConfig` carries every knob of a packing run. Named configurations
//! live in a [`ConfigRegistry`] that always holds exactly one default.
//! [`AppConfig::from_env`] reads `LOAD_PLANNER_*` variables and falls back to
//! the defaults with a warning when a value cannot be used.

use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{Level, info, warn};

use crate::error::{PackingError, Result};
use crate::types::EPSILON_GENERAL;

/// Where items without a destination label go in the loading order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlabeledPolicy {
    /// Loaded after all labeled groups, so unloaded first.
    #[default]
    LoadLast,
    /// Loaded before all labeled groups, so unloaded last.
    LoadFirst,
}

impl FromStr for UnlabeledPolicy {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "load_last" => Ok(UnlabeledPolicy::LoadLast),
            "load_first" => Ok(UnlabeledPolicy::LoadFirst),
            other => Err(format!("unknown unlabeled policy '{}'", other)),
        }
    }
}

/// Configuration of one packing run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    /// Registry name.
    pub name: String,
    /// Maximum number of item layers in one stack.
    pub max_stack_height: u32,
    /// Maximum weight of one stack chain including the top item (kg).
    pub max_weight_per_stack: f64,
    /// Share of the base area that must be supported, in percent.
    pub support_percentage: f64,
    /// Global rotation switch. `false` pins every item to its given orientation.
    pub enable_rotation: bool,
    /// Serve repeated identical requests from the result cache.
    pub enable_caching: bool,
    /// Weight of the volume term in the placement score.
    pub priority_volume_weight: f64,
    /// Weight of the weight-distribution term in the placement score.
    pub priority_weight_weight: f64,
    pub is_default: bool,
    /// Tolerance for all geometric comparisons.
    pub epsilon: f64,
    /// Allowed lateral centroid offset as a share of half the vehicle width.
    pub balance_tolerance_ratio: f64,
    /// Forbid items of an earlier stop below items of a later stop.
    pub enforce_unload_order: bool,
    pub unlabeled_policy: UnlabeledPolicy,
    /// Unstackable items lie on their smallest dimension.
    pub lay_flat_unstackable: bool,
    /// Cap on (point, orientation) evaluations for a single item.
    pub max_evaluations_per_item: Option<u64>,
    /// Cap on evaluations for the whole run.
    pub evaluation_budget: Option<u64>,
    /// Wall-clock budget for the placing phase in milliseconds.
    pub time_budget_ms: Option<u64>,
}

impl AlgorithmConfig {
    pub const DEFAULT_NAME: &'static str = "default";
    pub const DEFAULT_MAX_STACK_HEIGHT: u32 = 3;
    pub const DEFAULT_MAX_WEIGHT_PER_STACK: f64 = 1000.0;
    pub const DEFAULT_SUPPORT_PERCENTAGE: f64 = 100.0;
    pub const DEFAULT_PRIORITY_VOLUME_WEIGHT: f64 = 0.7;
    pub const DEFAULT_PRIORITY_WEIGHT_WEIGHT: f64 = 0.3;
    pub const DEFAULT_EPSILON: f64 = EPSILON_GENERAL;
    /// Bounds for epsilon; smaller values overflow the quantized point keys.
    pub const MIN_EPSILON: f64 = 1e-9;
    pub const MAX_EPSILON: f64 = 1.0;
    pub const DEFAULT_BALANCE_TOLERANCE_RATIO: f64 = 0.45;
    pub const DEFAULT_MAX_EVALUATIONS_PER_ITEM: u64 = 50_000;
    pub const DEFAULT_TIME_BUDGET_MS: u64 = 30_000;

    /// Creates a builder for a custom configuration.
    pub fn builder() -> AlgorithmConfigBuilder {
        AlgorithmConfigBuilder::default()
    }

    /// Rejects missing or contradictory settings.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(PackingError::Configuration(msg));

        if self.name.trim().is_empty() {
            return fail("configuration name must not be empty".into());
        }
        if self.max_stack_height == 0 {
            return fail("max_stack_height must be at least 1".into());
        }
        if !(self.max_weight_per_stack.is_finite() && self.max_weight_per_stack > 0.0) {
            return fail(format!(
                "max_weight_per_stack must be positive, got {}",
                self.max_weight_per_stack
            ));
        }
        if !(0.0..=100.0).contains(&self.support_percentage) {
            return fail(format!(
                "support_percentage must be between 0 and 100, got {}",
                self.support_percentage
            ));
        }
        let (pv, pw) = (self.priority_volume_weight, self.priority_weight_weight);
        if !(pv.is_finite() && pw.is_finite()) || pv < 0.0 || pw < 0.0 {
            return fail(format!(
                "priority weights must be non-negative, got {} / {}",
                pv, pw
            ));
        }
        if pv + pw <= 0.0 {
            return fail("priority weights must not both be zero".into());
        }
        if !(Self::MIN_EPSILON..=Self::MAX_EPSILON).contains(&self.epsilon) {
            return fail(format!(
                "epsilon must be between {:e} and {}, got {:e}",
                Self::MIN_EPSILON,
                Self::MAX_EPSILON,
                self.epsilon
            ));
        }
        if !(0.0..=1.0).contains(&self.balance_tolerance_ratio) {
            return fail(format!(
                "balance_tolerance_ratio must be between 0 and 1, got {}",
                self.balance_tolerance_ratio
            ));
        }
        if self.max_evaluations_per_item == Some(0) {
            return fail("max_evaluations_per_item must be at least 1".into());
        }
        Ok(())
    }
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            max_stack_height: Self::DEFAULT_MAX_STACK_HEIGHT,
            max_weight_per_stack: Self::DEFAULT_MAX_WEIGHT_PER_STACK,
            support_percentage: Self::DEFAULT_SUPPORT_PERCENTAGE,
            enable_rotation: true,
            enable_caching: true,
            priority_volume_weight: Self::DEFAULT_PRIORITY_VOLUME_WEIGHT,
            priority_weight_weight: Self::DEFAULT_PRIORITY_WEIGHT_WEIGHT,
            is_default: true,
            epsilon: Self::DEFAULT_EPSILON,
            balance_tolerance_ratio: Self::DEFAULT_BALANCE_TOLERANCE_RATIO,
            enforce_unload_order: true,
            unlabeled_policy: UnlabeledPolicy::default(),
            lay_flat_unstackable: false,
            max_evaluations_per_item: Some(Self::DEFAULT_MAX_EVALUATIONS_PER_ITEM),
            evaluation_budget: None,
            time_budget_ms: Some(Self::DEFAULT_TIME_BUDGET_MS),
        }
    }
}

/// Builder for [`AlgorithmConfig`].
#[derive(Clone, Debug, Default)]
pub struct AlgorithmConfigBuilder {
    config: AlgorithmConfig,
}

impl AlgorithmConfigBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn max_stack_height(mut self, height: u32) -> Self {
        self.config.max_stack_height = height;
        self
    }

    pub fn max_weight_per_stack(mut self, weight: f64) -> Self {
        self.config.max_weight_per_stack = weight;
        self
    }

    pub fn support_percentage(mut self, percentage: f64) -> Self {
        self.config.support_percentage = percentage;
        self
    }

    pub fn enable_rotation(mut self, enabled: bool) -> Self {
        self.config.enable_rotation = enabled;
        self
    }

    pub fn enable_caching(mut self, enabled: bool) -> Self {
        self.config.enable_caching = enabled;
        self
    }

    /// Sets the volume and weight priorities of the placement score.
    pub fn priorities(mut self, volume: f64, weight: f64) -> Self {
        self.config.priority_volume_weight = volume;
        self.config.priority_weight_weight = weight;
        self
    }

    pub fn is_default(mut self, is_default: bool) -> Self {
        self.config.is_default = is_default;
        self
    }

    pub fn epsilon(mut self, epsilon: f64) -> Self {
        self.config.epsilon = epsilon;
        self
    }

    pub fn balance_tolerance_ratio(mut self, ratio: f64) -> Self {
        self.config.balance_tolerance_ratio = ratio;
        self
    }

    pub fn enforce_unload_order(mut self, enforce: bool) -> Self {
        self.config.enforce_unload_order = enforce;
        self
    }

    pub fn unlabeled_policy(mut self, policy: UnlabeledPolicy) -> Self {
        self.config.unlabeled_policy = policy;
        self
    }

    pub fn lay_flat_unstackable(mut self, lay_flat: bool) -> Self {
        self.config.lay_flat_unstackable = lay_flat;
        self
    }

    pub fn max_evaluations_per_item(mut self, cap: Option<u64>) -> Self {
        self.config.max_evaluations_per_item = cap;
        self
    }

    pub fn evaluation_budget(mut self, budget: Option<u64>) -> Self {
        self.config.evaluation_budget = budget;
        self
    }

    pub fn time_budget_ms(mut self, budget: Option<u64>) -> Self {
        self.config.time_budget_ms = budget;
        self
    }

    /// Creates the final configuration.
    pub fn build(self) -> AlgorithmConfig {
        self.config
    }
}

/// Partial configuration sent with a request; set fields replace the base value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlgorithmConfigOverride {
    pub max_stack_height: Option<u32>,
    pub max_weight_per_stack: Option<f64>,
    pub support_percentage: Option<f64>,
    pub enable_rotation: Option<bool>,
    pub enable_caching: Option<bool>,
    pub priority_volume_weight: Option<f64>,
    pub priority_weight_weight: Option<f64>,
    pub balance_tolerance_ratio: Option<f64>,
    pub enforce_unload_order: Option<bool>,
    pub unlabeled_policy: Option<UnlabeledPolicy>,
    pub lay_flat_unstackable: Option<bool>,
    pub max_evaluations_per_item: Option<u64>,
    pub evaluation_budget: Option<u64>,
    pub time_budget_ms: Option<u64>,
}

impl AlgorithmConfigOverride {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Returns `base` with every set field replaced.
    pub fn apply(&self, base: &AlgorithmConfig) -> AlgorithmConfig {
        let mut config = base.clone();
        macro_rules! take {
            ($field:ident) => {
                if let Some(value) = self.$field {
                    config.$field = value;
                }
            };
        }
        take!(max_stack_height);
        take!(max_weight_per_stack);
        take!(support_percentage);
        take!(enable_rotation);
        take!(enable_caching);
        take!(priority_volume_weight);
        take!(priority_weight_weight);
        take!(balance_tolerance_ratio);
        take!(enforce_unload_order);
        take!(unlabeled_policy);
        take!(lay_flat_unstackable);
        if self.max_evaluations_per_item.is_some() {
            config.max_evaluations_per_item = self.max_evaluations_per_item;
        }
        if self.evaluation_budget.is_some() {
            config.evaluation_budget = self.evaluation_budget;
        }
        if self.time_budget_ms.is_some() {
            config.time_budget_ms = self.time_budget_ms;
        }
        config
    }
}

/// Named algorithm configurations with exactly one default.
#[derive(Clone, Debug)]
pub struct ConfigRegistry {
    default: AlgorithmConfig,
    others: BTreeMap<String, AlgorithmConfig>,
}

impl ConfigRegistry {
    /// Creates a registry whose default is `default`.
    pub fn new(mut default: AlgorithmConfig) -> Result<Self> {
        default.validate()?;
        default.is_default = true;
        Ok(Self {
            default,
            others: BTreeMap::new(),
        })
    }

    /// Adds or replaces a configuration.
    ///
    /// A configuration flagged `is_default` becomes the new default and the
    /// previous default loses the flag.
    pub fn register(&mut self, mut config: AlgorithmConfig) -> Result<()> {
        config.validate()?;

        if config.name == self.default.name {
            config.is_default = true;
            self.default = config;
            return Ok(());
        }

        if config.is_default {
            self.others.remove(&config.name);
            let mut previous = std::mem::replace(&mut self.default, config);
            previous.is_default = false;
            info!(
                "⚙️ Default configuration changed from '{}' to '{}'",
                previous.name, self.default.name
            );
            self.others.insert(previous.name.clone(), previous);
        } else {
            self.others.insert(config.name.clone(), config);
        }
        Ok(())
    }

    pub fn default_config(&self) -> &AlgorithmConfig {
        &self.default
    }

    pub fn get(&self, name: &str) -> Option<&AlgorithmConfig> {
        if self.default.name == name {
            Some(&self.default)
        } else {
            self.others.get(name)
        }
    }

    /// Looks up a configuration by name, the default when `name` is `None`.
    pub fn resolve(&self, name: Option<&str>) -> Result<&AlgorithmConfig> {
        match name {
            None => Ok(&self.default),
            Some(name) => self.get(name).ok_or_else(|| {
                PackingError::Configuration(format!("unknown configuration '{}'", name))
            }),
        }
    }

    /// All registered names in lexicographic order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.others.keys().cloned().collect();
        names.push(self.default.name.clone());
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.others.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for ConfigRegistry {
    fn default() -> Self {
        Self {
            default: AlgorithmConfig::default(),
            others: BTreeMap::new(),
        }
    }
}

/// Settings of the packing service around the engine.
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceConfig {
    /// Maximum number of cached results.
    pub cache_capacity: usize,
    /// Maximum number of job records kept for re-query.
    pub job_capacity: usize,
}

impl ServiceConfig {
    pub const DEFAULT_CACHE_CAPACITY: usize = 128;
    pub const DEFAULT_JOB_CAPACITY: usize = 1024;
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache_capacity: Self::DEFAULT_CACHE_CAPACITY,
            job_capacity: Self::DEFAULT_JOB_CAPACITY,
        }
    }
}

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub algorithm: AlgorithmConfig,
    pub service: ServiceConfig,
    pub log_level: Level,
}

impl AppConfig {
    const PREFIX: &'static str = "LOAD_PLANNER_";

    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(env_string)
    }

    /// Log level from `LOAD_PLANNER_LOG_LEVEL`, `INFO` when unset or unknown.
    ///
    /// Reads quietly so the subscriber can be installed before
    /// [`AppConfig::from_env`] reports its warnings.
    pub fn log_level_from_env() -> Level {
        Self::log_level_from_lookup(env_string)
    }

    pub fn log_level_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Level {
        lookup(&format!("{}LOG_LEVEL", Self::PREFIX))
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(Level::INFO)
    }

    /// Creates a configuration from an arbitrary variable source.
    ///
    /// `lookup` receives full variable names (`LOAD_PLANNER_...`) and returns
    /// trimmed, non-empty values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |suffix: &str| format!("{}{}", Self::PREFIX, suffix);
        let loader = Loader { lookup: &lookup };
        let defaults = AlgorithmConfig::default();

        let max_stack_height = loader.parsed(
            &var("MAX_STACK_HEIGHT"),
            defaults.max_stack_height,
            |v: &u32| *v >= 1,
            "must be at least 1",
        );
        let max_weight_per_stack = loader.f64_with_warning(
            &var("MAX_WEIGHT_PER_STACK"),
            defaults.max_weight_per_stack,
            |v| v > 0.0,
            "must be greater than 0",
            "Adjusted stack weight limit changes which stacks are allowed",
        );
        let support_percentage = loader.f64_with_warning(
            &var("SUPPORT_PERCENTAGE"),
            defaults.support_percentage,
            |v| (0.0..=100.0).contains(&v),
            "must be between 0 and 100",
            "Reduced support percentage allows overhanging items",
        );
        let enable_rotation = loader.flag(&var("ENABLE_ROTATION"), defaults.enable_rotation);
        let enable_caching = loader.flag(&var("ENABLE_CACHING"), defaults.enable_caching);
        let priority_volume_weight = loader.f64_with_warning(
            &var("PRIORITY_VOLUME_WEIGHT"),
            defaults.priority_volume_weight,
            |v| v >= 0.0,
            "must not be negative",
            "Adjusted volume priority changes placement scoring",
        );
        let priority_weight_weight = loader.f64_with_warning(
            &var("PRIORITY_WEIGHT_WEIGHT"),
            defaults.priority_weight_weight,
            |v| v >= 0.0,
            "must not be negative",
            "Adjusted weight priority changes placement scoring",
        );
        let epsilon = loader.f64_with_warning(
            &var("EPSILON"),
            defaults.epsilon,
            |v| (AlgorithmConfig::MIN_EPSILON..=AlgorithmConfig::MAX_EPSILON).contains(&v),
            "must be between 1e-9 and 1",
            "Adjusted tolerances may cause numerical instabilities",
        );
        let balance_tolerance_ratio = loader.f64_with_warning(
            &var("BALANCE_TOLERANCE"),
            defaults.balance_tolerance_ratio,
            |v| (0.0..=1.0).contains(&v),
            "must be between 0 and 1",
            "Adjusted balance tolerance changes lateral load distribution",
        );
        let enforce_unload_order =
            loader.flag(&var("ENFORCE_UNLOAD_ORDER"), defaults.enforce_unload_order);
        let unlabeled_policy = loader.parsed(
            &var("UNLABELED_POLICY"),
            defaults.unlabeled_policy,
            |_| true,
            "must be load_last or load_first",
        );
        let lay_flat_unstackable =
            loader.flag(&var("LAY_FLAT_UNSTACKABLE"), defaults.lay_flat_unstackable);
        let max_evaluations_per_item = loader.optional_limit(
            &var("MAX_EVALUATIONS_PER_ITEM"),
            defaults.max_evaluations_per_item,
        );
        let evaluation_budget =
            loader.optional_limit(&var("EVALUATION_BUDGET"), defaults.evaluation_budget);
        let time_budget_ms = loader.optional_limit(&var("TIME_BUDGET_MS"), defaults.time_budget_ms);

        let mut algorithm = AlgorithmConfig::builder()
            .max_stack_height(max_stack_height)
            .max_weight_per_stack(max_weight_per_stack)
            .support_percentage(support_percentage)
            .enable_rotation(enable_rotation)
            .enable_caching(enable_caching)
            .priorities(priority_volume_weight, priority_weight_weight)
            .epsilon(epsilon)
            .balance_tolerance_ratio(balance_tolerance_ratio)
            .enforce_unload_order(enforce_unload_order)
            .unlabeled_policy(unlabeled_policy)
            .lay_flat_unstackable(lay_flat_unstackable)
            .max_evaluations_per_item(max_evaluations_per_item)
            .evaluation_budget(evaluation_budget)
            .time_budget_ms(time_budget_ms)
            .build();

        if let Err(err) = algorithm.validate() {
            warn!("⚠️ {}. Using the default algorithm configuration.", err);
            algorithm = AlgorithmConfig::default();
        }

        let cache_capacity = loader.parsed(
            &var("CACHE_CAPACITY"),
            ServiceConfig::DEFAULT_CACHE_CAPACITY,
            |v: &usize| *v >= 1,
            "must be at least 1",
        );
        let job_capacity = loader.parsed(
            &var("JOB_CAPACITY"),
            ServiceConfig::DEFAULT_JOB_CAPACITY,
            |v: &usize| *v >= 1,
            "must be at least 1",
        );
        let log_level = loader.parsed(&var("LOG_LEVEL"), Level::INFO, |_| true, "unknown level");

        Self {
            algorithm,
            service: ServiceConfig {
                cache_capacity,
                job_capacity,
            },
            log_level,
        }
    }
}

/// Parsing helpers with warn-and-fallback behavior.
struct Loader<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Loader<'_, F> {
    fn parsed<T>(&self, var_name: &str, default: T, validator: impl Fn(&T) -> bool, hint: &str) -> T
    where
        T: FromStr + std::fmt::Debug,
        T::Err: std::fmt::Display,
    {
        let Some(raw) = (self.lookup)(var_name) else {
            return default;
        };
        match raw.parse::<T>() {
            Ok(value) if validator(&value) => value,
            Ok(_) => {
                warn!(
                    "⚠️ {} contains invalid value '{}': {}. Using {:?}.",
                    var_name, raw, hint, default
                );
                default
            }
            Err(err) => {
                warn!(
                    "⚠️ Could not parse {} ('{}'): {}. Using {:?}.",
                    var_name, raw, err, default
                );
                default
            }
        }
    }

    fn f64_with_warning(
        &self,
        var_name: &str,
        default: f64,
        validator: impl Fn(f64) -> bool,
        invalid_hint: &str,
        warning: &str,
    ) -> f64 {
        let value = self.parsed(var_name, default, |v: &f64| v.is_finite() && validator(*v), invalid_hint);
        let tolerance = (default.abs().max(1.0)) * 1e-9;
        if (value - default).abs() > tolerance {
            warn!("⚠️ {} ({} = {}).", warning, var_name, value);
        }
        value
    }

    fn flag(&self, var_name: &str, default: bool) -> bool {
        (self.lookup)(var_name)
            .and_then(|raw| parse_bool(&raw, var_name))
            .unwrap_or(default)
    }

    /// `0`, `none` or `off` disable a limit, positive integers set it.
    fn optional_limit(&self, var_name: &str, default: Option<u64>) -> Option<u64> {
        let Some(raw) = (self.lookup)(var_name) else {
            return default;
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "0" | "none" | "off" | "unlimited" => None,
            other => match other.parse::<u64>() {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(
                        "⚠️ Could not parse {} ('{}'): {}. Using {:?}.",
                        var_name, raw, err, default
                    );
                    default
                }
            },
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!("⚠️ Access to {} failed: {}. Using default value.", name, err);
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            warn!(
                "⚠️ Could not interpret {} ('{}') as boolean value. Using default value.",
                var_name, other
            );
            None
        }
    }
}
