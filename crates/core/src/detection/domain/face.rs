/// One detected face in image pixel coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceDescriptor {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Ordered faces reported by a detector for one image.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    faces: Vec<FaceDescriptor>,
}

impl DetectionResult {
    pub fn new(faces: Vec<FaceDescriptor>) -> Self {
        Self { faces }
    }

    pub fn faces(&self) -> &[FaceDescriptor] {
        &self.faces
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn has_faces(&self) -> bool {
        !self.is_empty()
    }
}

impl From<Vec<FaceDescriptor>> for DetectionResult {
    fn from(faces: Vec<FaceDescriptor>) -> Self {
        Self::new(faces)
    }
}
