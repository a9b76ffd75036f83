use blockext_core::document::BlockReference;
use blockext_core::geometry::{Extents3, Point2, Point3};
use glam::{DMat2, DVec2};

/// 按根块参照自身旋转与比例摆放的包围矩形。
///
/// 只是把块坐标系中的轴对齐盒的四个角旋转、缩放后平移到插入点，
/// 并非最小面积外接矩形。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedRectangle {
    corners: [Point2; 4],
    elevation: f64,
}

impl OrientedRectangle {
    /// 角点顺序固定：(maxX,maxY)、(minX,maxY)、(minX,minY)、(maxX,minY)，构成闭合四边形。
    pub fn from_local_extents(reference: &BlockReference, local: &Extents3) -> Self {
        let (min, max) = (local.min(), local.max());
        let rotation = DMat2::from_angle(reference.rotation);
        let scale = DVec2::new(reference.scale.0.x, reference.scale.0.y);
        let base = DVec2::new(reference.insert.x(), reference.insert.y());
        let corners = [
            (max.x(), max.y()),
            (min.x(), max.y()),
            (min.x(), min.y()),
            (max.x(), min.y()),
        ]
        .map(|(x, y)| Point2::from_vec(base + rotation * (DVec2::new(x, y) * scale)));
        Self {
            corners,
            elevation: reference.insert.z(),
        }
    }

    #[inline]
    pub fn corners(&self) -> [Point2; 4] {
        self.corners
    }

    #[inline]
    pub fn elevation(&self) -> f64 {
        self.elevation
    }

    /// 位于插入点高度的三维角点，用于生成调试轮廓。
    pub fn outline(&self) -> [Point3; 4] {
        self.corners
            .map(|corner| Point3::new(corner.x(), corner.y(), self.elevation))
    }

    /// 旋转后的宽（沿块 X 轴）与高（沿块 Y 轴）。
    pub fn side_lengths(&self) -> (f64, f64) {
        (
            self.corners[0].distance_to(self.corners[1]),
            self.corners[1].distance_to(self.corners[2]),
        )
    }
}
