use std::time::Duration;

use bevy::prelude::*;
use bevy_args::{Deserialize, Parser, Serialize, ValueEnum};

use crate::queue::{PoolSettings, QueueSettings};


#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    Hash,
    PartialEq,
    Reflect,
    Deserialize,
    Serialize,
    ValueEnum,
)]
pub enum BuildEnvironment {
    Editor,
    #[default]
    Development,
    Shipping,
}


#[derive(Clone, Debug, Resource, Serialize, Deserialize, Parser, Reflect)]
#[command(about = "bevy_vertex_paint demo", version, long_about = None)]
#[reflect(Resource)]
pub struct VertexPaintConfig {
    /// selects which task cap applies
    #[arg(long, value_enum, default_value_t = BuildEnvironment::Development)]
    pub environment: BuildEnvironment,

    /// concurrent tasks per category in the editor
    #[arg(long, default_value = "15")]
    pub editor_task_cap: usize,

    /// concurrent tasks per category in development builds
    #[arg(long, default_value = "15")]
    pub development_task_cap: usize,

    /// concurrent tasks per category in shipping builds
    #[arg(long, default_value = "25")]
    pub shipping_task_cap: usize,

    /// worker threads, 0 derives the count from the hardware
    #[arg(long, default_value = "0")]
    pub worker_threads: usize,

    /// use every hardware thread instead of leaving one for the main thread
    #[arg(long, default_value = "false")]
    pub use_all_hardware_threads: bool,

    /// run tasks on the calling thread
    #[arg(long, default_value = "false")]
    pub synchronous: bool,

    /// idle time before the worker pool is released
    #[arg(long, default_value = "5000")]
    pub pool_teardown_grace_ms: u64,

    /// warn when more tasks than this are queued for one mesh
    #[arg(long, default_value = "50")]
    pub mesh_queue_warning_depth: usize,

    #[arg(long, default_value = "false")]
    pub log_task_summaries: bool,

    /// number of meshes spawned by the demo
    #[arg(long, default_value = "8")]
    pub demo_meshes: usize,
}

impl Default for VertexPaintConfig {
    fn default() -> VertexPaintConfig {
        VertexPaintConfig {
            environment: BuildEnvironment::Development,
            editor_task_cap: 15,
            development_task_cap: 15,
            shipping_task_cap: 25,
            worker_threads: 0,
            use_all_hardware_threads: false,
            synchronous: false,
            pool_teardown_grace_ms: 5000,
            mesh_queue_warning_depth: 50,
            log_task_summaries: false,
            demo_meshes: 8,
        }
    }
}

impl VertexPaintConfig {
    pub fn task_cap(&self) -> usize {
        match self.environment {
            BuildEnvironment::Editor => self.editor_task_cap,
            BuildEnvironment::Development => self.development_task_cap,
            BuildEnvironment::Shipping => self.shipping_task_cap,
        }
    }

    pub fn queue_settings(&self) -> QueueSettings {
        let cap = self.task_cap();
        QueueSettings {
            paint_cap: cap,
            detect_cap: cap,
            pool: PoolSettings {
                worker_threads: self.worker_threads,
                use_all_hardware_threads: self.use_all_hardware_threads,
                synchronous: self.synchronous,
            },
            teardown_grace: Duration::from_millis(self.pool_teardown_grace_ms),
            mesh_queue_warning_depth: self.mesh_queue_warning_depth,
            log_task_summaries: self.log_task_summaries,
        }
    }
}
