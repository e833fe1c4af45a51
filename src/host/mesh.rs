use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// One host polygon: its corner vertex indices, material slot and shading mode.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub vertices: Vec<u32>,
    pub material_index: u32,
    pub smooth: bool,
}

impl Polygon {
    pub fn new(vertices: impl Into<Vec<u32>>) -> Self {
        Self {
            vertices: vertices.into(),
            material_index: 0,
            smooth: false,
        }
    }

    pub fn with_material(mut self, material_index: u32) -> Self {
        self.material_index = material_index;
        self
    }

    pub fn smooth(mut self) -> Self {
        self.smooth = true;
        self
    }
}

/// Named per-vertex or per-corner attribute layer.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeLayer<T> {
    pub name: String,
    pub values: Vec<T>,
}

impl<T> AttributeLayer<T> {
    pub fn new(name: impl Into<String>, values: Vec<T>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeCrease {
    pub v0: u32,
    pub v1: u32,
    /// Host crease weight in `[0, 1]`.
    pub weight: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SubdivScheme {
    #[default]
    CatmullClark,
    Loop,
    Bilinear,
}

impl SubdivScheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CatmullClark => "catmull-clark",
            Self::Loop => "loop",
            Self::Bilinear => "bilinear",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BoundaryInterpolation {
    None,
    #[default]
    EdgesAndCorners,
    EdgesOnly,
}

impl BoundaryInterpolation {
    pub fn code(self) -> i32 {
        match self {
            Self::None => 0,
            Self::EdgesAndCorners => 1,
            Self::EdgesOnly => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FaceVaryingInterpolation {
    Smooth,
    CornersPlusOne,
    CornersOnly,
    #[default]
    Boundaries,
}

impl FaceVaryingInterpolation {
    pub fn code(self) -> i32 {
        match self {
            Self::Smooth => 0,
            Self::CornersPlusOne => 1,
            Self::CornersOnly => 2,
            Self::Boundaries => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubdivSettings {
    pub scheme: SubdivScheme,
    pub boundary: BoundaryInterpolation,
    pub face_varying: FaceVaryingInterpolation,
}

/// Rest-pose data, in object (`pref`, `nref`) and world (`wpref`, `wnref`) space.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReferencePose {
    pub pref: Option<Vec<Vec3>>,
    pub wpref: Option<Vec<Vec3>>,
    pub nref: Option<Vec<Vec3>>,
    pub wnref: Option<Vec<Vec3>>,
}

/// Evaluated host mesh data block.
#[derive(Debug, Clone, PartialEq)]
pub struct HostMesh {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub polygons: Vec<Polygon>,
    /// Auto-smooth flag: treat every face as smooth.
    pub smooth_all: bool,
    pub uv_layers: Vec<AttributeLayer<Vec2>>,
    pub color_layers: Vec<AttributeLayer<Vec3>>,
    pub creases: Vec<EdgeCrease>,
    /// Material slots; `None` is an empty slot.
    pub materials: Vec<Option<String>>,
    pub subdivision: Option<SubdivSettings>,
    pub reference_pose: ReferencePose,
    pub revision: u64,
}

impl HostMesh {
    pub fn new(name: impl Into<String>, positions: Vec<Vec3>, polygons: Vec<Polygon>) -> Self {
        Self {
            name: name.into(),
            positions,
            polygons,
            smooth_all: false,
            uv_layers: Vec::new(),
            color_layers: Vec::new(),
            creases: Vec::new(),
            materials: Vec::new(),
            subdivision: None,
            reference_pose: ReferencePose::default(),
            revision: 0,
        }
    }

    /// Axis-aligned unit quad grid in the XY plane with `columns * rows` faces.
    pub fn grid(name: impl Into<String>, columns: usize, rows: usize) -> Self {
        let mut positions = Vec::with_capacity((columns + 1) * (rows + 1));
        for y in 0..=rows {
            for x in 0..=columns {
                positions.push(Vec3::new(x as f32, y as f32, 0.0));
            }
        }
        let width = (columns + 1) as u32;
        let mut polygons = Vec::with_capacity(columns * rows);
        for y in 0..rows as u32 {
            for x in 0..columns as u32 {
                let i = y * width + x;
                polygons.push(Polygon::new([i, i + 1, i + width + 1, i + width]));
            }
        }
        Self::new(name, positions, polygons)
    }

    pub fn point_count(&self) -> usize {
        self.positions.len()
    }

    pub fn face_count(&self) -> usize {
        self.polygons.len()
    }

    pub fn corner_count(&self) -> usize {
        self.polygons.iter().map(|p| p.vertices.len()).sum()
    }

    pub fn with_materials<I, S>(mut self, materials: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.materials = materials.into_iter().map(|m| Some(m.into())).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_counts_match_layout() {
        let mesh = HostMesh::grid("plane", 3, 2);
        assert_eq!(mesh.point_count(), 12);
        assert_eq!(mesh.face_count(), 6);
        assert_eq!(mesh.corner_count(), 24);
        assert_eq!(mesh.polygons[0].vertices, vec![0, 1, 5, 4]);
    }
}
