use glam::{Vec2, Vec3};
use serde::Serialize;

/// Primvar granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Detail {
    Constant,
    Uniform,
    Vertex,
    FaceVarying,
}

impl Detail {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Constant => "constant",
            Self::Uniform => "uniform",
            Self::Vertex => "vertex",
            Self::FaceVarying => "facevarying",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PrimvarValue {
    Int(Vec<i32>),
    Float(Vec<f32>),
    Float2(Vec<Vec2>),
    Point(Vec<Vec3>),
    Normal(Vec<Vec3>),
    Vector(Vec<Vec3>),
    Color(Vec<Vec3>),
    String(Vec<String>),
}

impl PrimvarValue {
    pub fn len(&self) -> usize {
        match self {
            Self::Int(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Float2(v) => v.len(),
            Self::Point(v) | Self::Normal(v) | Self::Vector(v) | Self::Color(v) => v.len(),
            Self::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Float2(_) => "float2",
            Self::Point(_) => "point",
            Self::Normal(_) => "normal",
            Self::Vector(_) => "vector",
            Self::Color(_) => "color",
            Self::String(_) => "string",
        }
    }
}

/// A named primvar, either static (`samples` has one entry at time 0) or
/// motion-sampled (one entry per shutter time).
#[derive(Debug, Clone, PartialEq)]
pub struct Primvar {
    pub name: String,
    pub detail: Detail,
    pub samples: Vec<(f32, PrimvarValue)>,
}

impl Primvar {
    pub fn is_time_sampled(&self) -> bool {
        self.samples.len() > 1
    }

    pub fn value(&self) -> Option<&PrimvarValue> {
        self.samples.first().map(|(_, value)| value)
    }
}

/// Ordered set of primvars, unique by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrimvarSet {
    entries: Vec<Primvar>,
}

impl PrimvarSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, detail: Detail, value: PrimvarValue) {
        self.insert(Primvar {
            name: name.into(),
            detail,
            samples: vec![(0.0, value)],
        });
    }

    /// Time-sampled overload; `times` and `values` pair up in order.
    pub fn set_sampled(
        &mut self,
        name: impl Into<String>,
        detail: Detail,
        times: &[f32],
        values: Vec<PrimvarValue>,
    ) {
        self.insert(Primvar {
            name: name.into(),
            detail,
            samples: times.iter().copied().zip(values).collect(),
        });
    }

    fn insert(&mut self, primvar: Primvar) {
        match self.entries.iter_mut().find(|p| p.name == primvar.name) {
            Some(existing) => *existing = primvar,
            None => self.entries.push(primvar),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Primvar> {
        self.entries.iter().find(|p| p.name == name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Primvar> {
        let index = self.entries.iter().position(|p| p.name == name)?;
        Some(self.entries.remove(index))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Primvar> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|p| p.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i32),
    Float(f32),
    Color(Vec3),
    String(String),
    StringArray(Vec<String>),
    FloatArray(Vec<f32>),
}

/// Ordered shader/light parameter list, unique by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamList {
    entries: Vec<(String, ParamValue)>,
}

impl ParamList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: ParamValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
