//! 块参照层级的包围盒聚合。
//!
//! 深度优先遍历块参照树：不可见图层上的图元连同其子树一并剪除，
//! 块参照展开为其定义成员，叶子图元的范围映射到累加坐标系后并入累加器。

use std::collections::HashSet;

use blockext_config::{AnnotationPolicy, BoundsConfig, StrategyKind};
use blockext_core::document::{
    BlockDefinition, BlockId, BlockReference, Document, Entity, EntityKind, Geometry,
};
use blockext_core::geometry::{Extents3, ExtentsError, Transform, Vector3};
use tracing::{debug, trace};

use crate::errors::EngineError;
use crate::oriented::OrientedRectangle;
use crate::visibility::LayerVisibilityTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundsOptions {
    pub strategy: StrategyKind,
    pub annotation_policy: AnnotationPolicy,
    pub max_depth: usize,
}

impl Default for BoundsOptions {
    fn default() -> Self {
        Self::from(&BoundsConfig::default())
    }
}

impl From<&BoundsConfig> for BoundsOptions {
    fn from(config: &BoundsConfig) -> Self {
        Self {
            strategy: config.strategy,
            annotation_policy: config.annotation_policy,
            max_depth: config.max_depth,
        }
    }
}

/// 一种遍历并累加范围的算法。两种实现的结果在旋转块中可能不同，不能互相替代。
pub trait BoundsStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// 把 `entity`（位于 `transform` 描述的坐标系中）的可见范围并入 `extents`。
    fn accumulate(
        &self,
        traversal: &mut Traversal<'_>,
        entity: &Entity,
        transform: &Transform,
        extents: &mut Extents3,
    ) -> Result<(), EngineError>;
}

pub fn strategy_for(kind: StrategyKind) -> &'static dyn BoundsStrategy {
    match kind {
        StrategyKind::Composed => &ComposedTransform,
        StrategyKind::Local => &LocalBounds,
    }
}

/// 单次计算的遍历状态：当前路径上的块定义与嵌套深度。
pub struct Traversal<'a> {
    document: &'a Document,
    visibility: &'a LayerVisibilityTable<'a>,
    annotation_policy: AnnotationPolicy,
    max_depth: usize,
    active: HashSet<BlockId>,
}

impl<'a> Traversal<'a> {
    pub fn new(
        document: &'a Document,
        visibility: &'a LayerVisibilityTable<'a>,
        options: &BoundsOptions,
    ) -> Self {
        Self {
            document,
            visibility,
            annotation_policy: options.annotation_policy,
            max_depth: options.max_depth,
            active: HashSet::new(),
        }
    }

    #[inline]
    pub fn is_layer_visible(&self, entity: &Entity) -> bool {
        self.visibility.is_visible(entity.layer)
    }

    #[inline]
    pub fn annotation_policy(&self) -> AnnotationPolicy {
        self.annotation_policy
    }

    /// 进入块定义并执行 `visit`，无论成功与否都会在返回前退出该定义。
    ///
    /// 同一定义在当前路径上重复出现时返回 [`EngineError::CyclicReference`]；
    /// 不同分支共享同一定义是允许的。
    pub fn with_definition<R>(
        &mut self,
        block: BlockId,
        visit: impl FnOnce(&mut Self, &'a BlockDefinition) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        let document = self.document;
        let definition = document
            .block(block)
            .ok_or(EngineError::DefinitionNotFound(block.get()))?;
        if self.active.len() >= self.max_depth {
            return Err(EngineError::DepthLimitExceeded {
                limit: self.max_depth,
            });
        }
        if !self.active.insert(block) {
            return Err(EngineError::CyclicReference {
                name: definition.name.clone(),
            });
        }
        let result = visit(self, definition);
        self.active.remove(&block);
        result
    }
}

/// 块定义成员过滤：不可见成员与被策略排除的属性定义不参与计算。
pub fn admits_member(policy: AnnotationPolicy, member: &Entity) -> bool {
    if !member.is_visible {
        return false;
    }
    match &member.kind {
        EntityKind::AttributeDefinition(definition) => match policy {
            AnnotationPolicy::ConstantVisible => {
                definition.is_constant && !definition.is_invisible
            }
            AnnotationPolicy::ExcludeAll => false,
        },
        _ => true,
    }
}

/// 叶子在 `transform` 下的范围。
///
/// 等比正交变换先生成变换副本再取范围（精确）；其余变换先取局部范围，
/// 再把两个角点映射过去，不会按旋转后的几何重新收紧。
pub fn leaf_extents<G: Geometry>(
    geometry: &G,
    transform: &Transform,
) -> Result<Extents3, ExtentsError> {
    if transform.is_uniscaled_ortho() {
        geometry.transformed(transform).extents()
    } else {
        geometry
            .extents()
            .map(|local| local.transformed_by(transform))
    }
}

fn merge_leaf<G: Geometry>(
    geometry: &G,
    kind: &'static str,
    transform: &Transform,
    extents: &mut Extents3,
) {
    match leaf_extents(geometry, transform) {
        Ok(leaf) => extents.merge(&leaf),
        Err(err) => debug!(kind, error = %err, "图元范围不可用，已忽略"),
    }
}

/// 沿遍历方向组合插入变换，在叶子处一次性映射范围。
#[derive(Debug, Clone, Copy, Default)]
pub struct ComposedTransform;

impl BoundsStrategy for ComposedTransform {
    fn name(&self) -> &'static str {
        "composed"
    }

    fn accumulate(
        &self,
        traversal: &mut Traversal<'_>,
        entity: &Entity,
        transform: &Transform,
        extents: &mut Extents3,
    ) -> Result<(), EngineError> {
        if !traversal.is_layer_visible(entity) {
            trace!(layer = entity.layer.get(), "图层不可见，剪除子树");
            return Ok(());
        }
        match &entity.kind {
            EntityKind::BlockReference(reference) => {
                let policy = traversal.annotation_policy();
                traversal.with_definition(reference.block, |traversal, definition| {
                    let composed = *transform * reference.block_transform(definition.base_point);
                    for member in definition
                        .members()
                        .filter(|member| admits_member(policy, member))
                    {
                        self.accumulate(traversal, member, &composed, extents)?;
                    }
                    Ok(())
                })
            }
            EntityKind::Shape(shape) => {
                merge_leaf(shape, shape.kind_name(), transform, extents);
                Ok(())
            }
            EntityKind::AttributeDefinition(definition) => {
                merge_leaf(definition, "attribute_definition", transform, extents);
                Ok(())
            }
        }
    }
}

/// 不向下传递变换：每层先求成员在块坐标系中的范围，再用本层插入变换映射到父坐标系。
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalBounds;

impl LocalBounds {
    fn local_extents(
        &self,
        traversal: &mut Traversal<'_>,
        entity: &Entity,
    ) -> Result<Option<Extents3>, EngineError> {
        if !traversal.is_layer_visible(entity) {
            trace!(layer = entity.layer.get(), "图层不可见，剪除子树");
            return Ok(None);
        }
        match &entity.kind {
            EntityKind::BlockReference(reference) => {
                let policy = traversal.annotation_policy();
                traversal.with_definition(reference.block, |traversal, definition| {
                    let mut inner = Extents3::empty();
                    let mut found = false;
                    for member in definition
                        .members()
                        .filter(|member| admits_member(policy, member))
                    {
                        if let Some(member_extents) = self.local_extents(traversal, member)? {
                            inner.merge(&member_extents);
                            found = true;
                        }
                    }
                    let placement = reference.block_transform(definition.base_point);
                    Ok(found.then(|| inner.transformed_by(&placement)))
                })
            }
            EntityKind::Shape(shape) => Ok(own_extents(shape, shape.kind_name())),
            EntityKind::AttributeDefinition(definition) => {
                Ok(own_extents(definition, "attribute_definition"))
            }
        }
    }
}

fn own_extents<G: Geometry>(geometry: &G, kind: &'static str) -> Option<Extents3> {
    match geometry.extents() {
        Ok(extents) => Some(extents),
        Err(err) => {
            debug!(kind, error = %err, "图元范围不可用，已忽略");
            None
        }
    }
}

impl BoundsStrategy for LocalBounds {
    fn name(&self) -> &'static str {
        "local"
    }

    fn accumulate(
        &self,
        traversal: &mut Traversal<'_>,
        entity: &Entity,
        transform: &Transform,
        extents: &mut Extents3,
    ) -> Result<(), EngineError> {
        if let Some(local) = self.local_extents(traversal, entity)? {
            let mapped = if transform.is_identity() {
                local
            } else {
                local.transformed_by(transform)
            };
            extents.merge(&mapped);
        }
        Ok(())
    }
}

/// 包围盒计算入口。文档与图层快照只读借用，累加器由每次调用独占。
pub struct BoundsAggregator<'a> {
    document: &'a Document,
    visibility: &'a LayerVisibilityTable<'a>,
    options: BoundsOptions,
}

impl<'a> BoundsAggregator<'a> {
    pub fn new(
        document: &'a Document,
        visibility: &'a LayerVisibilityTable<'a>,
        options: BoundsOptions,
    ) -> Self {
        Self {
            document,
            visibility,
            options,
        }
    }

    #[inline]
    pub fn strategy(&self) -> &'static dyn BoundsStrategy {
        strategy_for(self.options.strategy)
    }

    /// 世界坐标系下的包围盒；没有可见几何时返回空盒（最小点等于最大点）。
    pub fn extents(&self, root: &Entity) -> Result<Extents3, EngineError> {
        let strategy = self.strategy();
        let mut traversal = Traversal::new(self.document, self.visibility, &self.options);
        let mut extents = Extents3::empty();
        strategy.accumulate(&mut traversal, root, &Transform::IDENTITY, &mut extents)?;
        debug!(
            strategy = strategy.name(),
            empty = extents.is_empty(),
            "块范围计算完成"
        );
        Ok(extents)
    }

    /// 块参照自身坐标系下的包围盒：不应用根参照的插入变换，
    /// 只减去定义基点，嵌套参照的变换照常组合。
    pub fn local_extents(&self, reference: &BlockReference) -> Result<Extents3, EngineError> {
        let strategy = self.strategy();
        let policy = self.options.annotation_policy;
        let mut traversal = Traversal::new(self.document, self.visibility, &self.options);
        let mut extents = Extents3::empty();
        traversal.with_definition(reference.block, |traversal, definition| {
            let origin = Transform::translation(Vector3(-definition.base_point.as_vec3()));
            for member in definition
                .members()
                .filter(|member| admits_member(policy, member))
            {
                strategy.accumulate(traversal, member, &origin, &mut extents)?;
            }
            Ok(())
        })?;
        Ok(extents)
    }

    /// 按根参照自身旋转与比例摆放的包围矩形；根图层不可见或没有可见几何时返回 `None`。
    pub fn oriented_rectangle(
        &self,
        root: &Entity,
    ) -> Result<Option<OrientedRectangle>, EngineError> {
        let reference = root
            .as_block_reference()
            .ok_or(EngineError::NotABlockReference)?;
        if !self.visibility.is_visible(root.layer) {
            return Ok(None);
        }
        let local = self.local_extents(reference)?;
        if local.is_empty() {
            return Ok(None);
        }
        Ok(Some(OrientedRectangle::from_local_extents(reference, &local)))
    }
}
