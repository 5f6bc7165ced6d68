//! Parameter capability surface.
//!
//! The engine never owns host parameters; it drives them through
//! [`ParamControl`] and resolves addresses through [`ParamProvider`]. Two
//! concrete implementations ship for hosts that want ready-made parameters
//! (and for the demo binary): [`FloatParam`] and [`EnumParam`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use atomic_float::AtomicF32;
use parking_lot::Mutex;

/// Number of hot-bind slots a host can populate.
pub const HOT_BIND_SLOTS: u8 = 10;

/// A controllable parameter. All methods take `&self`; implementations use
/// interior mutability so handles can be shared across the tick and host
/// threads.
pub trait ParamControl: Send + Sync {
    /// Stable address used by persistence and logs.
    fn path(&self) -> &str;

    /// Current value normalized to [0, 1].
    fn normalized_value(&self) -> f32;

    /// Set from a normalized [0, 1] value (clamped by the parameter).
    fn set_normalized(&self, value: f32);

    /// Current raw value in parameter units.
    fn raw_value(&self) -> f32;

    /// Set the raw value (clamped to the parameter's range).
    fn set_raw(&self, value: f32);

    /// Add `amount` to the raw value.
    fn increment(&self, amount: f32);

    /// Whether the raw value is a bit mask rather than a scalar.
    fn is_bitmask(&self) -> bool {
        false
    }

    /// A mapping now drives this parameter.
    fn add_remote_controller(&self);

    /// A mapping stopped driving this parameter.
    fn remove_remote_controller(&self);

    /// Visual highlight pulse; hosts without a UI may ignore it.
    fn pulse_beacon(&self) {}
}

pub type ParamHandle = Arc<dyn ParamControl>;

/// Resolves parameter addresses and session-local special targets.
pub trait ParamProvider: Send + Sync {
    fn find(&self, path: &str) -> Option<ParamHandle>;

    /// Parameter currently hovered in the host UI, if any.
    fn hovered(&self) -> Option<ParamHandle> {
        None
    }

    /// Hot-bind slot `idx` (0..[`HOT_BIND_SLOTS`]), if populated.
    fn hot_bind(&self, _idx: u8) -> Option<ParamHandle> {
        None
    }
}

/// What a mapping entry points at.
#[derive(Clone)]
pub enum BindingTarget {
    /// No target, or a saved path that has not resolved yet. The path is
    /// kept so the entry round-trips through persistence unchanged.
    Unbound { path: Option<String> },
    /// A resolved parameter.
    Control(ParamHandle),
    /// Follow whatever parameter the host reports as hovered.
    Hover,
    /// One of the host's hot-bind slots.
    HotBind(u8),
}

impl BindingTarget {
    pub fn none() -> Self {
        BindingTarget::Unbound { path: None }
    }

    /// Parse a persisted target spec: `"hover"`, `"hotbindN"`, or a path.
    pub fn from_spec(spec: &str) -> Self {
        if spec == "hover" {
            return BindingTarget::Hover;
        }
        if let Some(digit) = spec.strip_prefix("hotbind") {
            if let Ok(idx) = digit.parse::<u8>() {
                if idx < HOT_BIND_SLOTS {
                    return BindingTarget::HotBind(idx);
                }
            }
        }
        BindingTarget::Unbound { path: Some(spec.to_string()) }
    }

    /// The persisted form of this target, `None` when there is nothing to
    /// save.
    pub fn spec(&self) -> Option<String> {
        match self {
            BindingTarget::Unbound { path } => path.clone(),
            BindingTarget::Control(handle) => Some(handle.path().to_string()),
            BindingTarget::Hover => Some("hover".to_string()),
            BindingTarget::HotBind(idx) => Some(format!("hotbind{}", idx)),
        }
    }

    /// Resolve to a live parameter, or `None` (the entry is inert for this
    /// pass). Unresolved paths retry, so parameters registered after load
    /// come alive without a reload.
    pub fn resolve(&self, params: &dyn ParamProvider) -> Option<ParamHandle> {
        match self {
            BindingTarget::Unbound { path: Some(path) } => params.find(path),
            BindingTarget::Unbound { path: None } => None,
            BindingTarget::Control(handle) => Some(handle.clone()),
            BindingTarget::Hover => params.hovered(),
            BindingTarget::HotBind(idx) => params.hot_bind(*idx),
        }
    }
}

impl fmt::Display for BindingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingTarget::Unbound { path: Some(path) } => write!(f, "{} (unresolved)", path),
            BindingTarget::Unbound { path: None } => write!(f, "(unbound)"),
            BindingTarget::Control(handle) => write!(f, "{}", handle.path()),
            BindingTarget::Hover => write!(f, "hover"),
            BindingTarget::HotBind(idx) => write!(f, "hotbind{}", idx),
        }
    }
}

/// A bounded float parameter backed by atomics.
pub struct FloatParam {
    path: String,
    min: f32,
    max: f32,
    value: AtomicF32,
    remote_refs: AtomicUsize,
    beacon_pulses: AtomicUsize,
}

impl FloatParam {
    pub fn new(path: impl Into<String>, min: f32, max: f32, value: f32) -> Arc<Self> {
        Arc::new(Self {
            path: path.into(),
            min,
            max,
            value: AtomicF32::new(value.clamp(min, max)),
            remote_refs: AtomicUsize::new(0),
            beacon_pulses: AtomicUsize::new(0),
        })
    }

    pub fn remote_controller_count(&self) -> usize {
        self.remote_refs.load(Ordering::Relaxed)
    }

    pub fn beacon_pulses(&self) -> usize {
        self.beacon_pulses.load(Ordering::Relaxed)
    }

    fn span(&self) -> f32 {
        (self.max - self.min).max(f32::EPSILON)
    }
}

impl ParamControl for FloatParam {
    fn path(&self) -> &str {
        &self.path
    }

    fn normalized_value(&self) -> f32 {
        (self.value.load(Ordering::Relaxed) - self.min) / self.span()
    }

    fn set_normalized(&self, value: f32) {
        let raw = self.min + value.clamp(0.0, 1.0) * self.span();
        self.value.store(raw, Ordering::Relaxed);
    }

    fn raw_value(&self) -> f32 {
        self.value.load(Ordering::Relaxed)
    }

    fn set_raw(&self, value: f32) {
        self.value.store(value.clamp(self.min, self.max), Ordering::Relaxed);
    }

    fn increment(&self, amount: f32) {
        let next = self.value.load(Ordering::Relaxed) + amount;
        self.value.store(next.clamp(self.min, self.max), Ordering::Relaxed);
    }

    fn add_remote_controller(&self) {
        self.remote_refs.fetch_add(1, Ordering::Relaxed);
    }

    fn remove_remote_controller(&self) {
        let _ = self
            .remote_refs
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    fn pulse_beacon(&self) {
        self.beacon_pulses.fetch_add(1, Ordering::Relaxed);
    }
}

/// An indexed-choice parameter. With `bitmask` set, the raw value is read
/// as a bit field by feedback (one flag per choice).
pub struct EnumParam {
    path: String,
    num_choices: usize,
    bitmask: bool,
    value: AtomicF32,
    remote_refs: AtomicUsize,
    beacon_pulses: AtomicUsize,
}

impl EnumParam {
    fn build(path: String, num_choices: usize, bitmask: bool) -> Arc<Self> {
        Arc::new(Self {
            path,
            num_choices: num_choices.max(1),
            bitmask,
            value: AtomicF32::new(0.0),
            remote_refs: AtomicUsize::new(0),
            beacon_pulses: AtomicUsize::new(0),
        })
    }

    pub fn new(path: impl Into<String>, num_choices: usize) -> Arc<Self> {
        Self::build(path.into(), num_choices, false)
    }

    pub fn bitmask(path: impl Into<String>, num_choices: usize) -> Arc<Self> {
        Self::build(path.into(), num_choices, true)
    }

    pub fn remote_controller_count(&self) -> usize {
        self.remote_refs.load(Ordering::Relaxed)
    }

    pub fn beacon_pulses(&self) -> usize {
        self.beacon_pulses.load(Ordering::Relaxed)
    }

    fn span(&self) -> f32 {
        (self.num_choices - 1).max(1) as f32
    }
}

impl ParamControl for EnumParam {
    fn path(&self) -> &str {
        &self.path
    }

    fn normalized_value(&self) -> f32 {
        self.value.load(Ordering::Relaxed) / self.span()
    }

    fn set_normalized(&self, value: f32) {
        let index = (value.clamp(0.0, 1.0) * self.span()).round();
        self.value.store(index, Ordering::Relaxed);
    }

    fn raw_value(&self) -> f32 {
        self.value.load(Ordering::Relaxed)
    }

    fn set_raw(&self, value: f32) {
        let max = if self.bitmask {
            // Full mask of all choices, not the top index.
            ((1u32 << self.num_choices.min(31)) - 1) as f32
        } else {
            self.span()
        };
        self.value.store(value.clamp(0.0, max), Ordering::Relaxed);
    }

    fn increment(&self, amount: f32) {
        let next = self.value.load(Ordering::Relaxed) + amount;
        self.value.store(next.clamp(0.0, self.span()), Ordering::Relaxed);
    }

    fn is_bitmask(&self) -> bool {
        self.bitmask
    }

    fn add_remote_controller(&self) {
        self.remote_refs.fetch_add(1, Ordering::Relaxed);
    }

    fn remove_remote_controller(&self) {
        let _ = self
            .remote_refs
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    fn pulse_beacon(&self) {
        self.beacon_pulses.fetch_add(1, Ordering::Relaxed);
    }
}

/// A straightforward [`ParamProvider`] for hosts and tests: registered
/// parameters by path plus the hover/hot-bind session state.
#[derive(Default)]
pub struct ParamRegistry {
    params: Mutex<BTreeMap<String, ParamHandle>>,
    hovered: Mutex<Option<ParamHandle>>,
    hot_binds: Mutex<[Option<ParamHandle>; HOT_BIND_SLOTS as usize]>,
}

impl ParamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, param: ParamHandle) {
        self.params.lock().insert(param.path().to_string(), param);
    }

    pub fn set_hovered(&self, param: Option<ParamHandle>) {
        *self.hovered.lock() = param;
    }

    pub fn set_hot_bind(&self, idx: u8, param: Option<ParamHandle>) {
        if idx < HOT_BIND_SLOTS {
            self.hot_binds.lock()[idx as usize] = param;
        }
    }

    /// Registered paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.params.lock().keys().cloned().collect()
    }
}

impl ParamProvider for ParamRegistry {
    fn find(&self, path: &str) -> Option<ParamHandle> {
        self.params.lock().get(path).cloned()
    }

    fn hovered(&self) -> Option<ParamHandle> {
        self.hovered.lock().clone()
    }

    fn hot_bind(&self, idx: u8) -> Option<ParamHandle> {
        self.hot_binds.lock().get(idx as usize)?.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_param_normalization() {
        let param = FloatParam::new("synth/cutoff", 20.0, 20000.0, 20.0);
        assert_eq!(param.normalized_value(), 0.0);

        param.set_normalized(1.0);
        assert_eq!(param.raw_value(), 20000.0);
        assert_eq!(param.normalized_value(), 1.0);

        param.set_normalized(2.0);
        assert_eq!(param.raw_value(), 20000.0);
    }

    #[test]
    fn test_float_param_set_raw_clamps() {
        let param = FloatParam::new("gain", 0.0, 1.0, 0.5);
        param.set_raw(127.0);
        assert_eq!(param.raw_value(), 1.0);
        param.set_raw(-3.0);
        assert_eq!(param.raw_value(), 0.0);
    }

    #[test]
    fn test_float_param_increment() {
        let param = FloatParam::new("pan", -1.0, 1.0, 0.0);
        param.increment(0.25);
        param.increment(0.25);
        assert_eq!(param.raw_value(), 0.5);
        param.increment(10.0);
        assert_eq!(param.raw_value(), 1.0);
    }

    #[test]
    fn test_remote_controller_refcount() {
        let param = FloatParam::new("x", 0.0, 1.0, 0.0);
        param.add_remote_controller();
        param.add_remote_controller();
        param.remove_remote_controller();
        assert_eq!(param.remote_controller_count(), 1);

        // Never underflows
        param.remove_remote_controller();
        param.remove_remote_controller();
        assert_eq!(param.remote_controller_count(), 0);
    }

    #[test]
    fn test_enum_param_steps() {
        let param = EnumParam::new("osc/wave", 4);
        param.set_normalized(1.0);
        assert_eq!(param.raw_value(), 3.0);
        param.set_normalized(0.34);
        assert_eq!(param.raw_value(), 1.0);
        param.increment(1.0);
        assert_eq!(param.raw_value(), 2.0);
    }

    #[test]
    fn test_enum_bitmask_holds_masks() {
        let param = EnumParam::bitmask("seq/steps", 8);
        assert!(param.is_bitmask());
        param.set_raw(0b1010 as u32 as f32);
        assert_eq!(param.raw_value() as u32, 0b1010);
    }

    #[test]
    fn test_binding_target_spec_round_trip() {
        let specs = ["hover", "hotbind3", "osc1/freq"];
        for spec in specs {
            let target = BindingTarget::from_spec(spec);
            assert_eq!(target.spec().as_deref(), Some(spec));
        }
        assert_eq!(BindingTarget::none().spec(), None);
    }

    #[test]
    fn test_hotbind_out_of_range_is_a_path() {
        // "hotbind12" exceeds the slot count and reads as a plain path.
        let target = BindingTarget::from_spec("hotbind12");
        match target {
            BindingTarget::Unbound { path: Some(p) } => assert_eq!(p, "hotbind12"),
            _ => panic!("expected unresolved path"),
        }
    }

    #[test]
    fn test_registry_resolution() {
        let registry = ParamRegistry::new();
        let cutoff = FloatParam::new("synth/cutoff", 0.0, 1.0, 0.0);
        registry.register(cutoff.clone());

        assert!(registry.find("synth/cutoff").is_some());
        assert!(registry.find("missing").is_none());

        registry.set_hovered(Some(cutoff.clone()));
        assert_eq!(registry.hovered().map(|p| p.path().to_string()),
            Some("synth/cutoff".to_string()));

        registry.set_hot_bind(2, Some(cutoff));
        assert!(registry.hot_bind(2).is_some());
        assert!(registry.hot_bind(3).is_none());

        let target = BindingTarget::from_spec("synth/cutoff");
        assert!(target.resolve(&registry).is_some());
        let missing = BindingTarget::from_spec("nope");
        assert!(missing.resolve(&registry).is_none());
    }
}
