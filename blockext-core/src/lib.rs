pub mod geometry {
    use std::ops::Mul;

    use glam::{DAffine3, DQuat, DVec2, DVec3};
    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    /// 点重合判定的全局容差，与宿主 CAD 默认的 EqualPoint 容差一致。
    pub const EQUAL_POINT_TOLERANCE: f64 = 1e-10;

    /// 判定矩阵是否等比正交时使用的相对容差。
    const ORTHO_TOLERANCE: f64 = 1e-9;

    /// 二维点，用于输出旋转包围矩形的角点。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn distance_to(self, other: Point2) -> f64 {
            self.0.distance(other.0)
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 三维点，内部以 `glam::DVec3` 表示。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point3(pub DVec3);

    impl Point3 {
        pub const ORIGIN: Self = Self(DVec3::ZERO);

        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn z(self) -> f64 {
            self.0.z
        }

        #[inline]
        pub fn as_vec3(self) -> DVec3 {
            self.0
        }

        #[inline]
        pub fn vector_to(self, other: Point3) -> Vector3 {
            Vector3(other.0 - self.0)
        }

        #[inline]
        pub fn distance_to(self, other: Point3) -> f64 {
            self.0.distance(other.0)
        }

        #[inline]
        pub fn is_equal_to(self, other: Point3) -> bool {
            self.distance_to(other) < EQUAL_POINT_TOLERANCE
        }
    }

    impl From<DVec3> for Point3 {
        fn from(value: DVec3) -> Self {
            Self(value)
        }
    }

    /// 三维向量，用于法向、比例与方向。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector3(pub DVec3);

    impl Vector3 {
        pub const X: Self = Self(DVec3::X);
        pub const Y: Self = Self(DVec3::Y);
        pub const Z: Self = Self(DVec3::Z);
        pub const ONE: Self = Self(DVec3::ONE);

        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        #[inline]
        pub fn as_vec3(self) -> DVec3 {
            self.0
        }

        #[inline]
        pub fn length(self) -> f64 {
            self.0.length()
        }

        #[inline]
        pub fn normalize(self) -> Option<Self> {
            let len = self.0.length();
            if len <= f64::EPSILON {
                None
            } else {
                Some(Self(self.0 / len))
            }
        }
    }

    impl From<DVec3> for Vector3 {
        fn from(value: DVec3) -> Self {
            Self(value)
        }
    }

    /// 图元范围计算失败的原因。聚合器会吞掉这些错误，只记录日志。
    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum ExtentsError {
        #[error("shape extends to infinity")]
        Unbounded,
        #[error("shape has no vertices")]
        NoVertices,
        #[error("text has no visible content")]
        EmptyText,
        #[error("non-positive size {0}")]
        DegenerateSize(f64),
    }

    /// 三维轴对齐包围盒。
    ///
    /// 不使用额外标记表示“空”：最小点与最大点重合（距离小于
    /// [`EQUAL_POINT_TOLERANCE`]）即视为尚未初始化。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Extents3 {
        min: Point3,
        max: Point3,
    }

    impl Extents3 {
        /// 由任意两个角点构造，内部按分量排序。
        #[inline]
        pub fn new(a: Point3, b: Point3) -> Self {
            Self {
                min: Point3(a.0.min(b.0)),
                max: Point3(a.0.max(b.0)),
            }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point3::ORIGIN,
                max: Point3::ORIGIN,
            }
        }

        #[inline]
        pub fn from_point(point: Point3) -> Self {
            Self {
                min: point,
                max: point,
            }
        }

        /// 点集的包围盒，点集为空时返回 `None`。
        pub fn from_points<I>(points: I) -> Option<Self>
        where
            I: IntoIterator<Item = Point3>,
        {
            let mut iter = points.into_iter();
            let first = iter.next()?;
            let mut extents = Self::from_point(first);
            for point in iter {
                extents.add_point(point);
            }
            Some(extents)
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.is_equal_to(self.max)
        }

        #[inline]
        pub fn min(&self) -> Point3 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point3 {
            self.max
        }

        #[inline]
        pub fn size(&self) -> Vector3 {
            self.min.vector_to(self.max)
        }

        pub fn add_point(&mut self, point: Point3) {
            self.min = Point3(self.min.0.min(point.0));
            self.max = Point3(self.max.0.max(point.0));
        }

        /// 纯并集，不检查空状态。
        pub fn add_extents(&mut self, other: &Extents3) {
            self.add_point(other.min);
            self.add_point(other.max);
        }

        /// 累加器语义：当前为空时直接替换，否则取并集。
        pub fn merge(&mut self, other: &Extents3) {
            if self.is_empty() {
                *self = *other;
            } else {
                self.add_extents(other);
            }
        }

        /// 只变换两个角点后重新排序，不会按旋转后的几何重新收紧。
        pub fn transformed_by(&self, transform: &Transform) -> Self {
            Self::new(transform.apply(self.min), transform.apply(self.max))
        }

        pub fn contains(&self, other: &Extents3) -> bool {
            let tolerance = DVec3::splat(EQUAL_POINT_TOLERANCE);
            (self.min.0 - tolerance).cmple(other.min.0).all()
                && (self.max.0 + tolerance).cmpge(other.max.0).all()
        }

        /// 按分量比较两个包围盒是否相同（在给定容差内）。
        pub fn abs_diff_eq(&self, other: &Extents3, tolerance: f64) -> bool {
            self.min.0.abs_diff_eq(other.min.0, tolerance)
                && self.max.0.abs_diff_eq(other.max.0, tolerance)
        }
    }

    /// 仿射变换（旋转 + 非等比缩放 + 平移），用 `*` 组合：`a * b` 先应用 `b`。
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct Transform(DAffine3);

    impl Transform {
        pub const IDENTITY: Self = Self(DAffine3::IDENTITY);

        #[inline]
        pub fn translation(offset: Vector3) -> Self {
            Self(DAffine3::from_translation(offset.0))
        }

        /// 插入变换：先缩放，再绕 Z 轴旋转，最后平移到插入点。
        pub fn placement(insert: Point3, rotation: f64, scale: Vector3) -> Self {
            Self(DAffine3::from_scale_rotation_translation(
                scale.0,
                DQuat::from_rotation_z(rotation),
                insert.0,
            ))
        }

        #[inline]
        pub fn apply(&self, point: Point3) -> Point3 {
            Point3(self.0.transform_point3(point.0))
        }

        #[inline]
        pub fn apply_vector(&self, vector: Vector3) -> Vector3 {
            Vector3(self.0.transform_vector3(vector.0))
        }

        #[inline]
        pub fn is_identity(&self) -> bool {
            self.0.abs_diff_eq(DAffine3::IDENTITY, EQUAL_POINT_TOLERANCE)
        }

        /// 线性部分三轴互相正交且长度相等（允许镜像）。
        /// 此类变换把轴对齐盒映射为可精确重算的形状。
        pub fn is_uniscaled_ortho(&self) -> bool {
            let m = self.0.matrix3;
            let (x, y, z) = (m.x_axis, m.y_axis, m.z_axis);
            let scale = x.length();
            if scale <= f64::EPSILON {
                return false;
            }
            let length_tolerance = ORTHO_TOLERANCE * scale;
            let dot_tolerance = ORTHO_TOLERANCE * scale * scale;
            (y.length() - scale).abs() <= length_tolerance
                && (z.length() - scale).abs() <= length_tolerance
                && x.dot(y).abs() <= dot_tolerance
                && y.dot(z).abs() <= dot_tolerance
                && z.dot(x).abs() <= dot_tolerance
        }

        /// X 轴方向的缩放量；仅在等比正交变换下等于整体比例。
        #[inline]
        pub fn uniform_scale(&self) -> f64 {
            self.0.matrix3.x_axis.length()
        }

        #[inline]
        pub fn is_mirroring(&self) -> bool {
            self.0.matrix3.determinant() < 0.0
        }
    }

    impl Default for Transform {
        fn default() -> Self {
            Self::IDENTITY
        }
    }

    impl Mul for Transform {
        type Output = Transform;

        fn mul(self, rhs: Transform) -> Transform {
            Transform(self.0 * rhs.0)
        }
    }

}

pub mod document {
    use std::collections::HashMap;
    use std::f64::consts::{PI, TAU};

    use glam::DVec3;
    use serde::{Deserialize, Serialize};

    use crate::geometry::{Extents3, ExtentsError, Point3, Transform, Vector3};

    /// 缺少字体度量时估算字宽：每个字符宽度 = 字高 × 宽度因子 × 该比例。
    pub const TEXT_ADVANCE_RATIO: f64 = 1.0;

    /// 任意轴算法阈值，决定 OCS X 轴参考的世界轴。
    const ARBITRARY_AXIS_LIMIT: f64 = 1.0 / 64.0;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct EntityId(u64);

    impl EntityId {
        #[inline]
        pub fn new(raw: u64) -> Self {
            Self(raw)
        }

        /// 提供原始数值，便于序列化或日志输出。
        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub struct LayerId(u32);

    impl LayerId {
        #[inline]
        pub fn new(raw: u32) -> Self {
            Self(raw)
        }

        #[inline]
        pub fn get(self) -> u32 {
            self.0
        }
    }

    /// 块定义标识。块定义归文档所有，块参照只持有该标识。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct BlockId(u32);

    impl BlockId {
        #[inline]
        pub fn new(raw: u32) -> Self {
            Self(raw)
        }

        #[inline]
        pub fn get(self) -> u32 {
            self.0
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Layer {
        pub name: String,
        pub is_frozen: bool,
        pub is_off: bool,
    }

    impl Layer {
        #[inline]
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                is_frozen: false,
                is_off: false,
            }
        }
    }

    /// 图元：图层引用 + 可见标记 + 具体类型。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Entity {
        pub layer: LayerId,
        pub is_visible: bool,
        pub kind: EntityKind,
    }

    impl Entity {
        #[inline]
        pub fn new(layer: LayerId, kind: EntityKind) -> Self {
            Self {
                layer,
                is_visible: true,
                kind,
            }
        }

        #[inline]
        pub fn shape(layer: LayerId, shape: Shape) -> Self {
            Self::new(layer, EntityKind::Shape(shape))
        }

        #[inline]
        pub fn with_visibility(mut self, is_visible: bool) -> Self {
            self.is_visible = is_visible;
            self
        }

        pub fn as_block_reference(&self) -> Option<&BlockReference> {
            match &self.kind {
                EntityKind::BlockReference(reference) => Some(reference),
                _ => None,
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum EntityKind {
        Shape(Shape),
        BlockReference(BlockReference),
        AttributeDefinition(AttributeDefinition),
    }

    /// 可计算自身范围、并可生成变换副本的几何。
    pub trait Geometry: Sized {
        fn extents(&self) -> Result<Extents3, ExtentsError>;
        fn transformed(&self, transform: &Transform) -> Self;
    }

    /// 叶子图元。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum Shape {
        Line(Line),
        Circle(Circle),
        Arc(Arc),
        Polyline(Polyline),
        Point(PointShape),
        Face3D(ThreeDFace),
        Text(Text),
        XLine(XLine),
    }

    impl Shape {
        pub fn kind_name(&self) -> &'static str {
            match self {
                Shape::Line(_) => "line",
                Shape::Circle(_) => "circle",
                Shape::Arc(_) => "arc",
                Shape::Polyline(_) => "polyline",
                Shape::Point(_) => "point",
                Shape::Face3D(_) => "3dface",
                Shape::Text(_) => "text",
                Shape::XLine(_) => "xline",
            }
        }
    }

    impl Geometry for Shape {
        fn extents(&self) -> Result<Extents3, ExtentsError> {
            match self {
                Shape::Line(line) => Ok(Extents3::new(line.start, line.end)),
                Shape::Circle(circle) => circle.extents(),
                Shape::Arc(arc) => arc.extents(),
                Shape::Polyline(polyline) => Extents3::from_points(polyline.vertices.iter().copied())
                    .ok_or(ExtentsError::NoVertices),
                Shape::Point(point) => Ok(Extents3::from_point(point.position)),
                Shape::Face3D(face) => Extents3::from_points(face.vertices)
                    .ok_or(ExtentsError::NoVertices),
                Shape::Text(text) => text.extents(),
                Shape::XLine(_) => Err(ExtentsError::Unbounded),
            }
        }

        fn transformed(&self, transform: &Transform) -> Self {
            match self {
                Shape::Line(line) => Shape::Line(Line {
                    start: transform.apply(line.start),
                    end: transform.apply(line.end),
                }),
                Shape::Circle(circle) => Shape::Circle(Circle {
                    center: transform.apply(circle.center),
                    radius: circle.radius * transform.uniform_scale(),
                    normal: oriented_normal(transform, circle.normal),
                }),
                Shape::Arc(arc) => Shape::Arc(arc.transformed(transform)),
                Shape::Polyline(polyline) => Shape::Polyline(Polyline {
                    vertices: polyline
                        .vertices
                        .iter()
                        .map(|vertex| transform.apply(*vertex))
                        .collect(),
                    is_closed: polyline.is_closed,
                }),
                Shape::Point(point) => Shape::Point(PointShape {
                    position: transform.apply(point.position),
                }),
                Shape::Face3D(face) => Shape::Face3D(ThreeDFace {
                    vertices: face.vertices.map(|vertex| transform.apply(vertex)),
                }),
                Shape::Text(text) => Shape::Text(text.transformed(transform)),
                Shape::XLine(xline) => Shape::XLine(XLine {
                    base: transform.apply(xline.base),
                    direction: transform.apply_vector(xline.direction),
                }),
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Line {
        pub start: Point3,
        pub end: Point3,
    }

    /// 圆，位于以 `normal` 为法向的平面内。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Circle {
        pub center: Point3,
        pub radius: f64,
        pub normal: Vector3,
    }

    impl Circle {
        fn extents(&self) -> Result<Extents3, ExtentsError> {
            if self.radius.is_nan() || self.radius <= 0.0 {
                return Err(ExtentsError::DegenerateSize(self.radius));
            }
            let n = unit_normal(self.normal);
            let half = DVec3::new(
                self.radius * (1.0 - n.x * n.x).max(0.0).sqrt(),
                self.radius * (1.0 - n.y * n.y).max(0.0).sqrt(),
                self.radius * (1.0 - n.z * n.z).max(0.0).sqrt(),
            );
            let center = self.center.as_vec3();
            Ok(Extents3::new(
                Point3(center - half),
                Point3(center + half),
            ))
        }
    }

    /// 圆弧，角度以弧度表示，在法向对应的 OCS 中按逆时针计量。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Arc {
        pub center: Point3,
        pub radius: f64,
        pub normal: Vector3,
        pub start_angle: f64,
        pub end_angle: f64,
    }

    impl Arc {
        pub fn point_at(&self, angle: f64) -> Point3 {
            let (u, v) = ocs_axes(self.normal);
            Point3(self.center.as_vec3() + (u * angle.cos() + v * angle.sin()) * self.radius)
        }

        fn extents(&self) -> Result<Extents3, ExtentsError> {
            if self.radius.is_nan() || self.radius <= 0.0 {
                return Err(ExtentsError::DegenerateSize(self.radius));
            }
            let (start, end) = canonical_interval(self.start_angle, self.end_angle);
            let mut extents = Extents3::new(self.point_at(start), self.point_at(end));

            // 每个世界坐标分量在 tan(t) = v_i / u_i 处取极值
            let (u, v) = ocs_axes(self.normal);
            for axis in 0..3 {
                let base = v[axis].atan2(u[axis]);
                for candidate in [base, base + PI] {
                    let mut angle = normalize_angle(candidate);
                    while angle < start {
                        angle += TAU;
                    }
                    if angle <= end {
                        extents.add_point(self.point_at(angle));
                    }
                }
            }
            Ok(extents)
        }

        fn transformed(&self, transform: &Transform) -> Self {
            let center = transform.apply(self.center);
            let normal = oriented_normal(transform, self.normal);
            let start = transform.apply(self.point_at(self.start_angle));
            let end = transform.apply(self.point_at(self.end_angle));
            let (u, v) = ocs_axes(normal);
            let angle_of = |point: Point3| {
                let offset = point.as_vec3() - center.as_vec3();
                offset.dot(v).atan2(offset.dot(u))
            };
            Self {
                center,
                radius: self.radius * transform.uniform_scale(),
                normal,
                start_angle: angle_of(start),
                end_angle: angle_of(end),
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Polyline {
        pub vertices: Vec<Point3>,
        pub is_closed: bool,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PointShape {
        pub position: Point3,
    }

    /// 3D 面（3DFACE）。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ThreeDFace {
        pub vertices: [Point3; 4],
    }

    /// 构造线：无限延伸，没有有限范围。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct XLine {
        pub base: Point3,
        pub direction: Vector3,
    }

    /// 单行文字。以基线方向与字高方向两个单位向量描述其平面框架，
    /// 变换后无需重新推导旋转角。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Text {
        pub insert: Point3,
        pub value: String,
        pub height: f64,
        pub width_factor: f64,
        pub direction: Vector3,
        pub up: Vector3,
    }

    impl Text {
        /// 位于 XY 平面、按 `rotation` 旋转的文字。
        pub fn new(insert: Point3, value: impl Into<String>, height: f64, rotation: f64) -> Self {
            let (sin, cos) = rotation.sin_cos();
            Self {
                insert,
                value: value.into(),
                height,
                width_factor: 1.0,
                direction: Vector3::new(cos, sin, 0.0),
                up: Vector3::new(-sin, cos, 0.0),
            }
        }

        pub fn estimated_width(&self) -> f64 {
            self.value.chars().count() as f64 * self.height * self.width_factor * TEXT_ADVANCE_RATIO
        }

        fn extents(&self) -> Result<Extents3, ExtentsError> {
            if self.value.trim().is_empty() {
                return Err(ExtentsError::EmptyText);
            }
            if self.height.is_nan() || self.height <= 0.0 {
                return Err(ExtentsError::DegenerateSize(self.height));
            }
            let along = self.direction.as_vec3() * self.estimated_width();
            let across = self.up.as_vec3() * self.height;
            let origin = self.insert.as_vec3();
            Extents3::from_points([
                Point3(origin),
                Point3(origin + along),
                Point3(origin + along + across),
                Point3(origin + across),
            ])
            .ok_or(ExtentsError::NoVertices)
        }

        fn transformed(&self, transform: &Transform) -> Self {
            let remap = |axis: Vector3| {
                transform
                    .apply_vector(axis)
                    .normalize()
                    .unwrap_or(axis)
            };
            Self {
                insert: transform.apply(self.insert),
                value: self.value.clone(),
                height: self.height * transform.uniform_scale(),
                width_factor: self.width_factor,
                direction: remap(self.direction),
                up: remap(self.up),
            }
        }
    }

    /// 块定义中的属性定义（注释字段）。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AttributeDefinition {
        pub tag: String,
        pub prompt: Option<String>,
        pub text: Text,
        pub is_constant: bool,
        pub is_invisible: bool,
    }

    impl Geometry for AttributeDefinition {
        fn extents(&self) -> Result<Extents3, ExtentsError> {
            self.text.extents()
        }

        fn transformed(&self, transform: &Transform) -> Self {
            Self {
                tag: self.tag.clone(),
                prompt: self.prompt.clone(),
                text: self.text.transformed(transform),
                is_constant: self.is_constant,
                is_invisible: self.is_invisible,
            }
        }
    }

    /// 块参照：指向共享块定义，并携带自身插入变换。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockReference {
        pub block: BlockId,
        pub insert: Point3,
        pub rotation: f64,
        pub scale: Vector3,
    }

    impl BlockReference {
        #[inline]
        pub fn new(block: BlockId, insert: Point3) -> Self {
            Self {
                block,
                insert,
                rotation: 0.0,
                scale: Vector3::ONE,
            }
        }

        #[inline]
        pub fn with_rotation(mut self, rotation: f64) -> Self {
            self.rotation = rotation;
            self
        }

        #[inline]
        pub fn with_scale(mut self, scale: Vector3) -> Self {
            self.scale = scale;
            self
        }

        /// 块坐标系到父坐标系的变换：先把基点移到原点，再缩放、旋转、平移。
        pub fn block_transform(&self, base_point: Point3) -> Transform {
            Transform::placement(self.insert, self.rotation, self.scale)
                * Transform::translation(Vector3(-base_point.as_vec3()))
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockDefinition {
        pub name: String,
        pub base_point: Point3,
        pub entities: Vec<Entity>,
    }

    impl BlockDefinition {
        #[inline]
        pub fn members(&self) -> impl Iterator<Item = &Entity> + '_ {
            self.entities.iter()
        }
    }

    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    pub struct Document {
        layers: Vec<Layer>,
        layer_index: HashMap<String, LayerId>,
        blocks: Vec<BlockDefinition>,
        block_index: HashMap<String, BlockId>,
        entities: Vec<(EntityId, Entity)>,
        next_entity_id: u64,
    }

    impl Document {
        pub fn new() -> Self {
            let mut doc = Self::default();
            doc.ensure_layer("0");
            doc
        }

        /// 返回同名图层的标识，不存在时新建。
        pub fn ensure_layer(&mut self, name: impl AsRef<str>) -> LayerId {
            let key = name.as_ref();
            if let Some(id) = self.layer_index.get(key) {
                return *id;
            }
            let id = LayerId(self.layers.len() as u32);
            self.layers.push(Layer::new(key));
            self.layer_index.insert(key.to_string(), id);
            id
        }

        #[inline]
        pub fn layer(&self, id: LayerId) -> Option<&Layer> {
            self.layers.get(id.0 as usize)
        }

        #[inline]
        pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
            self.layers.get_mut(id.0 as usize)
        }

        #[inline]
        pub fn layer_id(&self, name: &str) -> Option<LayerId> {
            self.layer_index.get(name).copied()
        }

        pub fn layers(&self) -> impl Iterator<Item = (LayerId, &Layer)> + '_ {
            self.layers
                .iter()
                .enumerate()
                .map(|(index, layer)| (LayerId(index as u32), layer))
        }

        /// 注册块定义；同名块已存在时返回原有标识。
        pub fn define_block(&mut self, name: impl Into<String>, base_point: Point3) -> BlockId {
            let name = name.into();
            if let Some(id) = self.block_index.get(&name) {
                return *id;
            }
            let id = BlockId(self.blocks.len() as u32);
            self.block_index.insert(name.clone(), id);
            self.blocks.push(BlockDefinition {
                name,
                base_point,
                entities: Vec::new(),
            });
            id
        }

        /// 向块定义追加成员，块不存在时返回 `false`。
        pub fn add_to_block(&mut self, block: BlockId, entity: Entity) -> bool {
            match self.blocks.get_mut(block.0 as usize) {
                Some(definition) => {
                    definition.entities.push(entity);
                    true
                }
                None => false,
            }
        }

        #[inline]
        pub fn block(&self, id: BlockId) -> Option<&BlockDefinition> {
            self.blocks.get(id.0 as usize)
        }

        #[inline]
        pub fn block_id(&self, name: &str) -> Option<BlockId> {
            self.block_index.get(name).copied()
        }

        pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &BlockDefinition)> + '_ {
            self.blocks
                .iter()
                .enumerate()
                .map(|(index, block)| (BlockId(index as u32), block))
        }

        /// 向模型空间追加图元。
        pub fn add_entity(&mut self, entity: Entity) -> EntityId {
            let id = self.next_id();
            self.entities.push((id, entity));
            id
        }

        pub fn add_line(&mut self, start: Point3, end: Point3, layer: impl AsRef<str>) -> EntityId {
            let layer = self.ensure_layer(layer);
            self.add_entity(Entity::shape(layer, Shape::Line(Line { start, end })))
        }

        pub fn add_polyline<I>(
            &mut self,
            vertices: I,
            is_closed: bool,
            layer: impl AsRef<str>,
        ) -> EntityId
        where
            I: IntoIterator<Item = Point3>,
        {
            let layer = self.ensure_layer(layer);
            let vertices = vertices.into_iter().collect();
            self.add_entity(Entity::shape(
                layer,
                Shape::Polyline(Polyline {
                    vertices,
                    is_closed,
                }),
            ))
        }

        pub fn add_block_reference(
            &mut self,
            reference: BlockReference,
            layer: impl AsRef<str>,
        ) -> EntityId {
            let layer = self.ensure_layer(layer);
            self.add_entity(Entity::new(layer, EntityKind::BlockReference(reference)))
        }

        pub fn entity(&self, id: EntityId) -> Option<&Entity> {
            self.entities
                .iter()
                .find(|(entity_id, _)| *entity_id == id)
                .map(|(_, entity)| entity)
        }

        pub fn entities(&self) -> impl Iterator<Item = (EntityId, &Entity)> + '_ {
            self.entities.iter().map(|(id, entity)| (*id, entity))
        }

        #[inline]
        fn next_id(&mut self) -> EntityId {
            let id = self.next_entity_id;
            self.next_entity_id += 1;
            EntityId(id)
        }
    }

    /// 任意轴算法：由法向推导 OCS 的 X、Y 轴。
    fn ocs_axes(normal: Vector3) -> (DVec3, DVec3) {
        let n = unit_normal(normal);
        let reference = if n.x.abs() < ARBITRARY_AXIS_LIMIT && n.y.abs() < ARBITRARY_AXIS_LIMIT {
            DVec3::Y
        } else {
            DVec3::Z
        };
        let x_axis = reference.cross(n).normalize();
        let y_axis = n.cross(x_axis);
        (x_axis, y_axis)
    }

    #[inline]
    fn unit_normal(normal: Vector3) -> DVec3 {
        normal.normalize().map(|n| n.as_vec3()).unwrap_or(DVec3::Z)
    }

    /// 法向是伪向量：镜像变换下需要反向，才能保持曲线的逆时针方向。
    fn oriented_normal(transform: &Transform, normal: Vector3) -> Vector3 {
        let mapped = transform.apply_vector(normal);
        let mapped = if transform.is_mirroring() {
            Vector3(-mapped.as_vec3())
        } else {
            mapped
        };
        mapped.normalize().unwrap_or(Vector3::Z)
    }

    fn normalize_angle(angle: f64) -> f64 {
        let mut result = angle % TAU;
        if result < 0.0 {
            result += TAU;
        }
        result
    }

    fn canonical_interval(start: f64, end: f64) -> (f64, f64) {
        let start = normalize_angle(start);
        let mut end = normalize_angle(end);
        if (end - start).abs() < 1e-9 {
            end = start + TAU;
        } else if end < start {
            end += TAU;
        }
        (start, end)
    }

}
