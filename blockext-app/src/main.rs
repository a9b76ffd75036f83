use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use blockext_config::{AppConfig, ConfigError, StrategyKind};
use blockext_core::document::{EntityId, EntityKind};
use blockext_engine::command::{
    BoundsSettings, CommandBus, CommandContext, CommandRequest, CommandResponse,
};
use blockext_engine::scene::Scene;
use blockext_io::{DocumentLoader, DocumentSaver, JsonFacade};
use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// 计算嵌套块参照的包围盒。
#[derive(Debug, Parser)]
#[command(name = "blockext", version)]
struct Cli {
    /// 配置文件路径，缺省时按 `BLOCKEXT_CONFIG` 与 `./config/default.toml` 查找
    #[arg(long)]
    config: Option<PathBuf>,
    /// JSON 文档快照；缺省时使用内置演示文档
    #[arg(long)]
    document: Option<PathBuf>,
    /// 要计算的模型空间实体；缺省时取第一个块参照
    #[arg(long)]
    entity: Option<u64>,
    /// 输出按块旋转摆放的包围矩形
    #[arg(long)]
    oriented: bool,
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,
    /// 不追加调试轮廓
    #[arg(long)]
    no_outline: bool,
    /// 计算后把文档写到此路径
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    Composed,
    Local,
}

impl From<StrategyArg> for StrategyKind {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Composed => StrategyKind::Composed,
            StrategyArg::Local => StrategyKind::Local,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut config = load_configuration(cli.config.clone());
    if let Some(strategy) = cli.strategy {
        config.bounds.strategy = strategy.into();
    }
    if cli.no_outline {
        config.bounds.draw_outline = false;
    }
    init_logging(&config);
    info!(strategy = ?config.bounds.strategy, "启动 blockext");

    match run(&cli, &config) {
        Ok(response) if response.success => {
            println!("{}", response.message.unwrap_or_default());
            ExitCode::SUCCESS
        }
        Ok(response) => {
            eprintln!("{}", response.message.unwrap_or_default());
            ExitCode::FAILURE
        }
        Err(err) => {
            error!(error = %err, "执行失败");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, config: &AppConfig) -> Result<CommandResponse> {
    let facade = JsonFacade::new().pretty();
    let mut scene = match &cli.document {
        Some(path) => {
            let document = facade
                .load(path)
                .with_context(|| format!("无法读取文档 {}", path.display()))?;
            Scene::with_document(document)
        }
        None => {
            let mut scene = Scene::new();
            let demo = scene.populate_demo();
            info!(root = demo.root.get(), "使用演示文档");
            scene
        }
    };

    let target = match cli.entity {
        Some(raw) => EntityId::new(raw),
        None => first_block_reference(&scene)?,
    };
    scene.select(target)?;

    let settings = BoundsSettings::from_config(config);
    let name = if cli.oriented {
        "block_bounds_oriented"
    } else {
        "block_bounds"
    };
    let bus = CommandBus::new();
    let response = {
        let mut context = CommandContext {
            scene: &mut scene,
            settings: &settings,
        };
        bus.dispatch(&CommandRequest::new(name), &mut context)
    };

    if let Some(path) = &cli.output {
        save_document(&facade, &scene, path)?;
    }
    Ok(response)
}

fn first_block_reference(scene: &Scene) -> Result<EntityId> {
    let found = scene
        .document()
        .entities()
        .find(|(_, entity)| matches!(entity.kind, EntityKind::BlockReference(_)))
        .map(|(id, _)| id);
    match found {
        Some(id) => Ok(id),
        None => bail!("文档中没有块参照，请使用 --entity 指定实体"),
    }
}

fn save_document(facade: &JsonFacade, scene: &Scene, path: &Path) -> Result<()> {
    facade
        .save(scene.document(), path)
        .with_context(|| format!("无法写出文档 {}", path.display()))?;
    info!(path = %path.display(), "文档已写出");
    Ok(())
}

fn load_configuration(override_path: Option<PathBuf>) -> AppConfig {
    match override_path {
        Some(path) => AppConfig::from_file(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "加载指定配置失败，使用默认配置");
            AppConfig::default()
        }),
        None => match AppConfig::discover() {
            Ok(cfg) => cfg,
            Err(err) => {
                match &err {
                    ConfigError::Io { path, .. }
                    | ConfigError::Parse { path, .. }
                    | ConfigError::Invalid { path, .. } => {
                        warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
                    }
                    ConfigError::Context { .. } => {
                        warn!(error = %err, "加载默认配置失败，使用内建默认值");
                    }
                }
                AppConfig::default()
            }
        },
    }
}

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_new(config.logging.level.clone())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
