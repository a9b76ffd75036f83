use blockext_core::document::{
    AttributeDefinition, BlockId, BlockReference, Circle, Document, Entity, EntityId, EntityKind,
    Line, Polyline, Shape, Text, XLine,
};
use blockext_core::geometry::{Point3, Vector3};
use tracing::debug;

use crate::errors::EngineError;

/// 宿主侧状态：文档与当前拾取的实体。
#[derive(Debug)]
pub struct Scene {
    document: Document,
    selected: Option<EntityId>,
}

#[derive(Debug, Clone, Copy)]
pub struct DemoEntities {
    pub root: EntityId,
    pub loose_line: EntityId,
    pub bracket: BlockId,
    pub bolt: BlockId,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            document: Document::new(),
            selected: None,
        }
    }

    /// 使用现有文档初始化场景。
    pub fn with_document(document: Document) -> Self {
        let mut scene = Self::new();
        scene.load_document(document);
        scene
    }

    /// 替换当前文档并清空选择。
    pub fn load_document(&mut self, document: Document) {
        self.document = document;
        self.selected = None;
    }

    /// 选中指定实体。若实体不存在则返回错误。
    pub fn select(&mut self, id: EntityId) -> Result<(), EngineError> {
        if self.document.entity(id).is_none() {
            return Err(EngineError::EntityNotFound(id.get()));
        }
        self.selected = Some(id);
        Ok(())
    }

    #[inline]
    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    #[inline]
    pub fn selection(&self) -> Option<EntityId> {
        self.selected
    }

    /// 当前选中的实体；未选择时返回 [`EngineError::NoSelection`]。
    pub fn selected_entity(&self) -> Result<(EntityId, &Entity), EngineError> {
        let id = self.selected.ok_or(EngineError::NoSelection)?;
        self.document
            .entity(id)
            .map(|entity| (id, entity))
            .ok_or(EngineError::EntityNotFound(id.get()))
    }

    #[inline]
    pub fn document(&self) -> &Document {
        &self.document
    }

    #[inline]
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.document.entity(id)
    }

    /// 构建一个两层嵌套的示例：支架块中放置两个螺栓块，并混入应被排除的注释几何。
    ///
    /// 根参照位于 (100,50,0)，可见几何的世界范围为 (100,50,0)-(120,60,0)。
    pub fn populate_demo(&mut self) -> DemoEntities {
        self.clear_selection();
        let doc = &mut self.document;
        let geom = doc.ensure_layer("GEOM");
        let centerline = doc.ensure_layer("Осевая");
        let holes = doc.ensure_layer("i_Отверстия");

        let bolt = doc.define_block("BOLT", Point3::ORIGIN);
        doc.add_to_block(
            bolt,
            Entity::shape(
                geom,
                Shape::Circle(Circle {
                    center: Point3::ORIGIN,
                    radius: 1.0,
                    normal: Vector3::Z,
                }),
            ),
        );
        doc.add_to_block(
            bolt,
            Entity::shape(
                centerline,
                Shape::Line(Line {
                    start: Point3::new(-2.0, 0.0, 0.0),
                    end: Point3::new(2.0, 0.0, 0.0),
                }),
            ),
        );
        doc.add_to_block(
            bolt,
            Entity::new(
                geom,
                EntityKind::AttributeDefinition(AttributeDefinition {
                    tag: "POS".to_string(),
                    prompt: None,
                    text: Text::new(Point3::new(1.5, -0.5, 0.0), "P1", 0.5, 0.0),
                    is_constant: true,
                    is_invisible: false,
                }),
            ),
        );
        doc.add_to_block(
            bolt,
            Entity::new(
                geom,
                EntityKind::AttributeDefinition(AttributeDefinition {
                    tag: "MARK".to_string(),
                    prompt: Some("Маркировка".to_string()),
                    text: Text::new(Point3::new(0.0, 5.0, 0.0), "M-12", 1.0, 0.0),
                    is_constant: false,
                    is_invisible: false,
                }),
            ),
        );

        let bracket = doc.define_block("BRACKET", Point3::ORIGIN);
        doc.add_to_block(
            bracket,
            Entity::shape(
                geom,
                Shape::Polyline(Polyline {
                    vertices: vec![
                        Point3::new(0.0, 0.0, 0.0),
                        Point3::new(20.0, 0.0, 0.0),
                        Point3::new(20.0, 10.0, 0.0),
                        Point3::new(0.0, 10.0, 0.0),
                    ],
                    is_closed: true,
                }),
            ),
        );
        for x in [5.0, 15.0] {
            doc.add_to_block(
                bracket,
                Entity::new(
                    geom,
                    EntityKind::BlockReference(BlockReference::new(
                        bolt,
                        Point3::new(x, 5.0, 0.0),
                    )),
                ),
            );
        }
        doc.add_to_block(
            bracket,
            Entity::shape(
                holes,
                Shape::Circle(Circle {
                    center: Point3::new(10.0, 5.0, 0.0),
                    radius: 30.0,
                    normal: Vector3::Z,
                }),
            ),
        );
        doc.add_to_block(
            bracket,
            Entity::shape(
                geom,
                Shape::XLine(XLine {
                    base: Point3::new(10.0, 5.0, 0.0),
                    direction: Vector3::X,
                }),
            ),
        );

        let root = doc.add_block_reference(
            BlockReference::new(bracket, Point3::new(100.0, 50.0, 0.0)),
            "0",
        );
        let loose_line = doc.add_line(Point3::ORIGIN, Point3::new(10.0, 0.0, 0.0), "0");

        let ids = DemoEntities {
            root,
            loose_line,
            bracket,
            bolt,
        };

        debug!(
            root = ids.root.get(),
            loose_line = ids.loose_line.get(),
            bracket = ids.bracket.get(),
            bolt = ids.bolt.get(),
            "已创建演示块结构"
        );

        ids
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_population_creates_nested_blocks() {
        let mut scene = Scene::new();
        let ids = scene.populate_demo();
        assert_eq!(scene.document().entities().count(), 2);
        assert_eq!(scene.document().blocks().count(), 2);
        let root = scene
            .entity(ids.root)
            .and_then(Entity::as_block_reference)
            .expect("root is a block reference");
        assert_eq!(root.block, ids.bracket);
        assert_eq!(
            scene.document().block(ids.bolt).map(|block| block.entities.len()),
            Some(4)
        );
    }

    #[test]
    fn selection_requires_existing_entity() {
        let mut scene = Scene::new();
        let ids = scene.populate_demo();

        assert!(matches!(scene.selected_entity(), Err(EngineError::NoSelection)));
        scene.select(ids.root).expect("select root");
        assert_eq!(scene.selection(), Some(ids.root));
        let (id, _) = scene.selected_entity().expect("selected entity");
        assert_eq!(id, ids.root);

        let err = scene.select(EntityId::new(9_999)).unwrap_err();
        assert!(matches!(err, EngineError::EntityNotFound(9_999)));
        assert_eq!(scene.selection(), Some(ids.root));

        scene.clear_selection();
        assert!(scene.selection().is_none());
    }

    #[test]
    fn load_document_resets_selection() {
        let mut scene = Scene::new();
        let ids = scene.populate_demo();
        scene.select(ids.root).unwrap();

        let mut document = Document::new();
        document.add_line(Point3::ORIGIN, Point3::new(1.0, 1.0, 0.0), "GEOM");
        scene.load_document(document);

        assert!(scene.selection().is_none());
        assert_eq!(scene.document().entities().count(), 1);
    }
}
