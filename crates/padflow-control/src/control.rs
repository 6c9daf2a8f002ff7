use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use std::sync::Arc;

use sha2::{Digest, Sha256};

/// Stable position of a control inside its controller layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlIndex(pub u32);

impl ControlIndex {
    #[inline]
    pub fn get(self) -> usize {
        self.0 as usize
    }
}

impl From<usize> for ControlIndex {
    fn from(value: usize) -> Self {
        Self(value as u32)
    }
}

impl fmt::Display for ControlIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Flavour of a continuous control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisKind {
    /// Absolute axis, reports a position in [-1, 1].
    Absolute,
    /// Free-running axis such as a mouse wheel. Never has to return to rest.
    Relative,
    /// Point-of-view hat.
    Hat,
}

/// Classification of a physical control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    /// Buttons and keys, effectively valued 0 or 1.
    Discrete,
    /// Axes and hats.
    Continuous(AxisKind),
    /// Output only (rumble, leds). Never polled.
    Feedback,
}

impl ControlKind {
    #[inline]
    pub fn is_discrete(self) -> bool {
        matches!(self, ControlKind::Discrete)
    }

    #[inline]
    pub fn is_polled(self) -> bool {
        !matches!(self, ControlKind::Feedback)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ControlKind::Discrete => "button",
            ControlKind::Continuous(AxisKind::Absolute) => "axis",
            ControlKind::Continuous(AxisKind::Relative) => "relative_axis",
            ControlKind::Continuous(AxisKind::Hat) => "hat",
            ControlKind::Feedback => "feedback",
        }
    }

    fn tag(self) -> u8 {
        match self {
            ControlKind::Discrete => 1,
            ControlKind::Continuous(AxisKind::Absolute) => 2,
            ControlKind::Continuous(AxisKind::Relative) => 3,
            ControlKind::Continuous(AxisKind::Hat) => 4,
            ControlKind::Feedback => 5,
        }
    }
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "button" => ControlKind::Discrete,
            "axis" => ControlKind::Continuous(AxisKind::Absolute),
            "relative_axis" => ControlKind::Continuous(AxisKind::Relative),
            "hat" => ControlKind::Continuous(AxisKind::Hat),
            "feedback" => ControlKind::Feedback,
            _ => return Err(format!("unknown control kind: {s}")),
        })
    }
}

/// One physical input element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    index: ControlIndex,
    name: Arc<str>,
    kind: ControlKind,
}

impl Control {
    pub fn index(&self) -> ControlIndex {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared handle to the name, cheap to put in every event.
    pub fn shared_name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn kind(&self) -> ControlKind {
        self.kind
    }
}

/// A named sub-controller, stored as a range of the layout's arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlGroup {
    pub name: Box<str>,
    pub range: Range<usize>,
}

/// Structural hash of a layout. Stable across processes and platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub u64);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s.trim_start_matches("0x"), 16).map(Fingerprint)
    }
}

/// Flattened, immutable set of controls of one physical controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerLayout {
    name: Box<str>,
    controls: Vec<Control>,
    groups: Vec<ControlGroup>,
    fingerprint: Fingerprint,
}

impl ControllerLayout {
    pub fn builder(name: &str) -> LayoutBuilder {
        LayoutBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    pub fn control(&self, index: ControlIndex) -> Option<&Control> {
        self.controls.get(index.get())
    }

    pub fn find(&self, name: &str) -> Option<&Control> {
        self.controls.iter().find(|c| &*c.name == name)
    }

    pub fn groups(&self) -> &[ControlGroup] {
        &self.groups
    }

    /// Returns every control belonging to the named sub-controller,
    /// including nested groups.
    pub fn group(&self, name: &str) -> Option<&[Control]> {
        self.groups
            .iter()
            .find(|g| &*g.name == name)
            .map(|g| &self.controls[g.range.clone()])
    }

    fn compute_fingerprint(controls: &[Control]) -> Fingerprint {
        let mut hasher = Sha256::new();
        for control in controls {
            hasher.update(control.name.as_bytes());
            hasher.update([0u8, control.kind.tag()]);
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Fingerprint(u64::from_be_bytes(bytes))
    }
}

/// Builds a [`ControllerLayout`] arena. Groups nest through closures and
/// are recorded as index ranges.
#[derive(Debug)]
pub struct LayoutBuilder {
    name: Box<str>,
    controls: Vec<Control>,
    groups: Vec<ControlGroup>,
}

impl LayoutBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            controls: Vec::new(),
            groups: Vec::new(),
        }
    }

    pub fn control(mut self, name: &str, kind: ControlKind) -> Self {
        let index = ControlIndex::from(self.controls.len());
        self.controls.push(Control {
            index,
            name: name.into(),
            kind,
        });
        self
    }

    pub fn button(self, name: &str) -> Self {
        self.control(name, ControlKind::Discrete)
    }

    pub fn axis(self, name: &str) -> Self {
        self.control(name, ControlKind::Continuous(AxisKind::Absolute))
    }

    pub fn relative_axis(self, name: &str) -> Self {
        self.control(name, ControlKind::Continuous(AxisKind::Relative))
    }

    pub fn hat(self, name: &str) -> Self {
        self.control(name, ControlKind::Continuous(AxisKind::Hat))
    }

    pub fn feedback(self, name: &str) -> Self {
        self.control(name, ControlKind::Feedback)
    }

    pub fn group(self, name: &str, f: impl FnOnce(Self) -> Self) -> Self {
        let start = self.controls.len();
        let mut this = f(self);
        let end = this.controls.len();
        this.groups.push(ControlGroup {
            name: name.into(),
            range: start..end,
        });
        this
    }

    pub fn build(self) -> ControllerLayout {
        let fingerprint = ControllerLayout::compute_fingerprint(&self.controls);
        ControllerLayout {
            name: self.name,
            controls: self.controls,
            groups: self.groups,
            fingerprint,
        }
    }
}
