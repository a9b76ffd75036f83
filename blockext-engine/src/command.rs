use std::collections::HashMap;

use blockext_config::AppConfig;
use blockext_core::geometry::{Extents3, Point2, Point3};
use tracing::{debug, info};

use crate::bounds::{BoundsAggregator, BoundsOptions};
use crate::errors::EngineError;
use crate::oriented::OrientedRectangle;
use crate::scene::Scene;
use crate::visibility::{LayerDenylist, LayerVisibilityTable};

/// 调试轮廓写入的图层。
pub const OUTLINE_LAYER: &str = "0";

#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub name: String,
}

impl CommandRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoundsReport {
    Extents(Extents3),
    Oriented(OrientedRectangle),
}

#[derive(Debug, Clone)]
pub struct CommandResponse {
    pub success: bool,
    pub message: Option<String>,
    pub report: Option<BoundsReport>,
}

impl CommandResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            report: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            report: None,
        }
    }

    pub fn with_report(mut self, report: BoundsReport) -> Self {
        self.report = Some(report);
        self
    }
}

/// 命令执行所需的计算设置，启动时由配置构建一次。
#[derive(Debug, Clone)]
pub struct BoundsSettings {
    pub options: BoundsOptions,
    pub denylist: LayerDenylist,
    pub draw_outline: bool,
}

impl BoundsSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            options: BoundsOptions::from(&config.bounds),
            denylist: LayerDenylist::from_config(&config.layers),
            draw_outline: config.bounds.draw_outline,
        }
    }
}

impl Default for BoundsSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse;
}

pub struct CommandContext<'a> {
    pub scene: &'a mut Scene,
    pub settings: &'a BoundsSettings,
}

pub struct CommandBus {
    handlers: HashMap<&'static str, Box<dyn CommandHandler>>,
}

impl CommandBus {
    pub fn new() -> Self {
        let mut bus = Self {
            handlers: HashMap::new(),
        };
        bus.register(BlockBoundsCommand);
        bus.register(OrientedBoundsCommand);
        bus.register(ClearSelectionCommand);
        bus
    }

    pub fn register<H: CommandHandler + 'static>(&mut self, handler: H) {
        self.handlers.insert(handler.name(), Box::new(handler));
    }

    pub fn dispatch(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        if let Some(handler) = self.handlers.get(request.name.as_str()) {
            handler.execute(request, context)
        } else {
            CommandResponse::err(format!("未知命令: {}", request.name))
        }
    }

    pub fn available_commands(&self) -> impl Iterator<Item = &&'static str> {
        self.handlers.keys()
    }
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}

/// 输出格式 `(x,y,z)`，负零按零输出。
pub fn format_point(point: Point3) -> String {
    format!(
        "({},{},{})",
        tidy(point.x()),
        tidy(point.y()),
        tidy(point.z())
    )
}

fn format_point2(point: Point2) -> String {
    format!("({},{})", tidy(point.x()), tidy(point.y()))
}

#[inline]
fn tidy(value: f64) -> f64 {
    if value == 0.0 { 0.0 } else { value }
}

/// 状态行：`MinPoint: (x,y,z) MaxPoint: (x,y,z)`。
pub fn status_message(extents: &Extents3) -> String {
    format!(
        "MinPoint: {} MaxPoint: {}",
        format_point(extents.min()),
        format_point(extents.max())
    )
}

/// 包围盒在最小 Z 平面上的闭合轮廓：min、(minX,maxY)、max、(maxX,minY)。
pub fn box_outline(extents: &Extents3) -> [Point3; 4] {
    let (min, max) = (extents.min(), extents.max());
    [
        min,
        Point3::new(min.x(), max.y(), min.z()),
        max,
        Point3::new(max.x(), min.y(), min.z()),
    ]
}

fn world_extents(scene: &Scene, settings: &BoundsSettings) -> Result<Extents3, EngineError> {
    let (_, root) = scene.selected_entity()?;
    let document = scene.document();
    let visibility = LayerVisibilityTable::snapshot(document, &settings.denylist);
    BoundsAggregator::new(document, &visibility, settings.options).extents(root)
}

fn oriented_rectangle(
    scene: &Scene,
    settings: &BoundsSettings,
) -> Result<Option<OrientedRectangle>, EngineError> {
    let (id, root) = scene.selected_entity()?;
    let document = scene.document();
    let visibility = LayerVisibilityTable::snapshot(document, &settings.denylist);
    BoundsAggregator::new(document, &visibility, settings.options)
        .oriented_rectangle(root)
        .inspect_err(|err| {
            debug!(entity = id.get(), error = %err, "无法计算旋转包围矩形");
        })
}

struct BlockBoundsCommand;

impl CommandHandler for BlockBoundsCommand {
    fn name(&self) -> &'static str {
        "block_bounds"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let extents = match world_extents(context.scene, context.settings) {
            Ok(extents) => extents,
            Err(err) => return CommandResponse::err(err.to_string()),
        };
        if extents.is_empty() {
            return CommandResponse::err("所选对象没有可见几何");
        }

        let message = status_message(&extents);
        info!(strategy = ?context.settings.options.strategy, %message, "块范围");
        if context.settings.draw_outline {
            let id = context
                .scene
                .document_mut()
                .add_polyline(box_outline(&extents), true, OUTLINE_LAYER);
            debug!(outline = id.get(), "已追加包围盒轮廓");
        }
        CommandResponse::ok(message).with_report(BoundsReport::Extents(extents))
    }
}

struct OrientedBoundsCommand;

impl CommandHandler for OrientedBoundsCommand {
    fn name(&self) -> &'static str {
        "block_bounds_oriented"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let rectangle = match oriented_rectangle(context.scene, context.settings) {
            Ok(Some(rectangle)) => rectangle,
            Ok(None) => return CommandResponse::err("所选对象没有可见几何"),
            Err(err) => return CommandResponse::err(err.to_string()),
        };

        let corners: Vec<String> = rectangle
            .corners()
            .into_iter()
            .map(format_point2)
            .collect();
        let message = format!("Corners: {}", corners.join(" "));
        info!(%message, "旋转包围矩形");
        if context.settings.draw_outline {
            let id = context
                .scene
                .document_mut()
                .add_polyline(rectangle.outline(), true, OUTLINE_LAYER);
            debug!(outline = id.get(), "已追加旋转包围轮廓");
        }
        CommandResponse::ok(message).with_report(BoundsReport::Oriented(rectangle))
    }
}

struct ClearSelectionCommand;

impl CommandHandler for ClearSelectionCommand {
    fn name(&self) -> &'static str {
        "clear_selection"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        context.scene.clear_selection();
        CommandResponse::ok("选择已清空")
    }
}

#[cfg(test)]
mod tests {
    use blockext_core::document::{Entity, EntityKind, Shape};

    use super::*;

    fn last_polyline(scene: &Scene) -> Vec<Point3> {
        let (_, entity) = scene
            .document()
            .entities()
            .last()
            .expect("document has entities");
        match entity {
            Entity {
                kind: EntityKind::Shape(Shape::Polyline(polyline)),
                ..
            } => {
                assert!(polyline.is_closed);
                polyline.vertices.clone()
            }
            other => panic!("expected outline polyline, got {other:?}"),
        }
    }

    #[test]
    fn block_bounds_reports_and_outlines_demo() {
        let mut scene = Scene::new();
        let ids = scene.populate_demo();
        scene.select(ids.root).unwrap();
        let settings = BoundsSettings {
            draw_outline: true,
            ..BoundsSettings::default()
        };

        let bus = CommandBus::new();
        let mut context = CommandContext {
            scene: &mut scene,
            settings: &settings,
        };
        let response = bus.dispatch(&CommandRequest::new("block_bounds"), &mut context);
        assert!(response.success, "{:?}", response.message);
        assert_eq!(
            response.message.as_deref(),
            Some("MinPoint: (100,50,0) MaxPoint: (120,60,0)")
        );
        assert!(matches!(response.report, Some(BoundsReport::Extents(_))));

        assert_eq!(scene.document().entities().count(), 3);
        assert_eq!(
            last_polyline(&scene),
            vec![
                Point3::new(100.0, 50.0, 0.0),
                Point3::new(100.0, 60.0, 0.0),
                Point3::new(120.0, 60.0, 0.0),
                Point3::new(120.0, 50.0, 0.0),
            ]
        );
    }

    #[test]
    fn outline_is_optional() {
        let mut scene = Scene::new();
        let ids = scene.populate_demo();
        scene.select(ids.loose_line).unwrap();
        let settings = BoundsSettings {
            draw_outline: false,
            ..BoundsSettings::default()
        };

        let bus = CommandBus::new();
        let mut context = CommandContext {
            scene: &mut scene,
            settings: &settings,
        };
        let response = bus.dispatch(&CommandRequest::new("block_bounds"), &mut context);
        assert_eq!(
            response.message.as_deref(),
            Some("MinPoint: (0,0,0) MaxPoint: (10,0,0)")
        );
        assert_eq!(scene.document().entities().count(), 2);
    }

    #[test]
    fn missing_selection_is_reported() {
        let mut scene = Scene::new();
        scene.populate_demo();
        let settings = BoundsSettings::default();
        let bus = CommandBus::new();
        let mut context = CommandContext {
            scene: &mut scene,
            settings: &settings,
        };

        for name in ["block_bounds", "block_bounds_oriented"] {
            let response = bus.dispatch(&CommandRequest::new(name), &mut context);
            assert!(!response.success);
            assert_eq!(
                response.message.as_deref(),
                Some(EngineError::NoSelection.to_string().as_str())
            );
        }
    }

    #[test]
    fn oriented_command_emits_four_corners() {
        let mut scene = Scene::new();
        let ids = scene.populate_demo();
        scene.select(ids.root).unwrap();
        let settings = BoundsSettings {
            draw_outline: true,
            ..BoundsSettings::default()
        };

        let bus = CommandBus::new();
        let mut context = CommandContext {
            scene: &mut scene,
            settings: &settings,
        };
        let response = bus.dispatch(&CommandRequest::new("block_bounds_oriented"), &mut context);
        assert!(response.success, "{:?}", response.message);
        assert_eq!(
            response.message.as_deref(),
            Some("Corners: (120,60) (100,60) (100,50) (120,50)")
        );
        assert_eq!(last_polyline(&scene).len(), 4);
    }

    #[test]
    fn oriented_command_rejects_plain_shapes() {
        let mut scene = Scene::new();
        let ids = scene.populate_demo();
        scene.select(ids.loose_line).unwrap();
        let settings = BoundsSettings::default();

        let bus = CommandBus::new();
        let mut context = CommandContext {
            scene: &mut scene,
            settings: &settings,
        };
        let response = bus.dispatch(&CommandRequest::new("block_bounds_oriented"), &mut context);
        assert!(!response.success);
        assert_eq!(
            response.message.as_deref(),
            Some(EngineError::NotABlockReference.to_string().as_str())
        );
    }

    #[test]
    fn hidden_root_layer_reports_no_geometry() {
        let mut scene = Scene::new();
        let ids = scene.populate_demo();
        scene.select(ids.root).unwrap();
        let zero = scene.document().layer_id("0").unwrap();
        scene.document_mut().layer_mut(zero).unwrap().is_frozen = true;
        let settings = BoundsSettings::default();

        let bus = CommandBus::new();
        let mut context = CommandContext {
            scene: &mut scene,
            settings: &settings,
        };
        let response = bus.dispatch(&CommandRequest::new("block_bounds"), &mut context);
        assert!(!response.success);
        assert!(response.report.is_none());
    }

    #[test]
    fn unknown_and_clear_commands() {
        let mut scene = Scene::new();
        let ids = scene.populate_demo();
        scene.select(ids.root).unwrap();
        let settings = BoundsSettings::default();

        let bus = CommandBus::new();
        let mut names: Vec<&str> = bus.available_commands().copied().collect();
        names.sort_unstable();
        assert_eq!(names, ["block_bounds", "block_bounds_oriented", "clear_selection"]);

        let mut context = CommandContext {
            scene: &mut scene,
            settings: &settings,
        };
        let response = bus.dispatch(&CommandRequest::new("zoom"), &mut context);
        assert!(!response.success);

        let response = bus.dispatch(&CommandRequest::new("clear_selection"), &mut context);
        assert!(response.success);
        assert!(context.scene.selection().is_none());
    }

    #[test]
    fn negative_zero_prints_as_zero() {
        assert_eq!(format_point(Point3::new(-0.0, 1.5, -2.0)), "(0,1.5,-2)");
    }
}
