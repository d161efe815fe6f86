use image::RgbImage;
use imageproc::point::Point;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in processed-frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Box covering a whole `width` x `height` frame
    pub fn full_frame(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f32 / self.height as f32
    }

    /// Corner form `[x1, y1, x2, y2]` with exclusive right/bottom edges
    pub fn to_xyxy(&self) -> [u32; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }
}

/// The two classes every detection is reported as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GarmentClass {
    HasGarment,
    NoGarment,
}

impl GarmentClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            GarmentClass::HasGarment => "has-garment",
            GarmentClass::NoGarment => "no-garment",
        }
    }
}

impl std::str::FromStr for GarmentClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "has-garment" => Ok(GarmentClass::HasGarment),
            "no-garment" => Ok(GarmentClass::NoGarment),
            other => Err(format!("unknown class label: {}", other)),
        }
    }
}

impl std::fmt::Display for GarmentClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class: GarmentClass,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f32, class: GarmentClass) -> Self {
        Self { bbox, confidence, class }
    }

    /// Stand-in result for a frame in which nothing was found
    pub fn fallback(width: u32, height: u32, confidence: f32) -> Self {
        Self::new(
            BoundingBox::full_frame(width, height),
            confidence,
            GarmentClass::NoGarment,
        )
    }

    pub fn to_record(&self) -> DetectionRecord {
        DetectionRecord {
            class: self.class,
            confidence: self.confidence,
            bbox: self.bbox.to_xyxy(),
        }
    }
}

/// Wire form of a detection: `{class, confidence, bbox: [x1, y1, x2, y2]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub class: GarmentClass,
    pub confidence: f32,
    pub bbox: [u32; 4],
}

/// Output of one detector invocation
#[derive(Debug, Clone)]
pub struct DetectionResult {
    /// Never empty
    pub detections: Vec<Detection>,
    /// Copy of the processed frame with the detections drawn on it
    pub annotated: RgbImage,
}

impl DetectionResult {
    pub fn records(&self) -> Vec<DetectionRecord> {
        self.detections.iter().map(Detection::to_record).collect()
    }
}

/// External border of a connected region in a binary mask
#[derive(Debug, Clone)]
pub struct Contour {
    pub points: Vec<Point<i32>>,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl Contour {
    /// Build from border points; `None` for an empty chain
    pub fn from_points(points: Vec<Point<i32>>) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }

        Some(Self {
            points,
            min_x: min_x.max(0) as u32,
            min_y: min_y.max(0) as u32,
            max_x: max_x.max(0) as u32,
            max_y: max_y.max(0) as u32,
        })
    }

    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    /// Area enclosed by the border chain (shoelace formula).
    /// A filled `w` x `h` rectangle measures `(w - 1) * (h - 1)`.
    pub fn area(&self) -> f32 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }

        let mut twice_area: i64 = 0;
        for i in 0..n {
            let p1 = self.points[i];
            let p2 = self.points[(i + 1) % n];
            twice_area += p1.x as i64 * p2.y as i64 - p2.x as i64 * p1.y as i64;
        }
        (twice_area.abs() as f32) / 2.0
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::new(self.min_x, self.min_y, self.width(), self.height())
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.bounding_box().aspect_ratio()
    }
}
