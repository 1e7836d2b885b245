//! # Manifest 模块
//!
//! 课程清单：按顺序列出阶段及其资源与活动。
//!
//! ## 格式
//!
//! ```json
//! {
//!   "title": "Orbital Mechanics 101",
//!   "stages": [
//!     { "id": "welcome", "title": "Welcome", "kind": "intro" },
//!     {
//!       "id": "gravity", "title": "Gravity", "kind": "lesson",
//!       "assets": [{ "key": "gravity_bg", "path": "images/gravity.svg" }],
//!       "activities": [{ "kind": "tap_targets", "time_limit": 20.0 }]
//!     }
//!   ]
//! }
//! ```
//!
//! 清单的顺序就是阶段的注册顺序。校验只产生警告，不阻止启动。

use serde::{Deserialize, Serialize};
use stage_runtime::StageDescriptor;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

use crate::activities::ACTIVITY_KINDS;
use crate::stages::STAGE_KINDS;

/// 课程清单
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// 课程标题
    #[serde(default)]
    pub title: String,
    /// 阶段（按顺序）
    #[serde(default)]
    pub stages: Vec<StageDescriptor>,
}

/// Manifest 校验警告
#[derive(Debug, Clone, PartialEq)]
pub enum ManifestWarning {
    /// 没有任何阶段
    NoStages,
    /// 阶段 ID 重复
    DuplicateStage { id: String },
    /// 未知阶段类型
    UnknownStageKind { stage: String, kind: String },
    /// 未知活动类型
    UnknownActivityKind {
        stage: String,
        index: usize,
        kind: String,
    },
    /// 时限无效（必须 > 0）
    InvalidTimeLimit {
        stage: String,
        index: usize,
        value: f32,
    },
    /// 课程阶段没有活动
    EmptyLesson { stage: String },
    /// 同一阶段内资源键重复
    DuplicateAssetKey { stage: String, key: String },
}

impl fmt::Display for ManifestWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestWarning::NoStages => write!(f, "清单中没有任何阶段"),
            ManifestWarning::DuplicateStage { id } => write!(f, "阶段 '{}' 重复定义", id),
            ManifestWarning::UnknownStageKind { stage, kind } => {
                write!(f, "阶段 '{}': 未知阶段类型 '{}'", stage, kind)
            }
            ManifestWarning::UnknownActivityKind { stage, index, kind } => {
                write!(f, "阶段 '{}' 活动 #{}: 未知活动类型 '{}'", stage, index, kind)
            }
            ManifestWarning::InvalidTimeLimit {
                stage,
                index,
                value,
            } => {
                write!(f, "阶段 '{}' 活动 #{}: 时限 {} 必须 > 0", stage, index, value)
            }
            ManifestWarning::EmptyLesson { stage } => {
                write!(f, "课程阶段 '{}' 没有活动", stage)
            }
            ManifestWarning::DuplicateAssetKey { stage, key } => {
                write!(f, "阶段 '{}': 资源键 '{}' 重复", stage, key)
            }
        }
    }
}

/// Manifest 加载错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ManifestError {
    #[error("无法读取 manifest 文件: {path} - {message}")]
    Io { path: String, message: String },

    #[error("无法解析 manifest JSON: {0}")]
    Parse(String),
}

impl Manifest {
    /// 从文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ManifestError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        serde_json::from_str(json).map_err(|e| ManifestError::Parse(e.to_string()))
    }

    /// 验证清单，返回所有警告
    pub fn validate(&self) -> Vec<ManifestWarning> {
        let mut warnings = Vec::new();

        if self.stages.is_empty() {
            warnings.push(ManifestWarning::NoStages);
        }

        let mut seen = BTreeSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.id.as_str()) {
                warnings.push(ManifestWarning::DuplicateStage {
                    id: stage.id.clone(),
                });
            }

            if !STAGE_KINDS.contains(&stage.kind.as_str()) {
                warnings.push(ManifestWarning::UnknownStageKind {
                    stage: stage.id.clone(),
                    kind: stage.kind.clone(),
                });
            }

            if stage.kind == "lesson" && stage.activities.is_empty() {
                warnings.push(ManifestWarning::EmptyLesson {
                    stage: stage.id.clone(),
                });
            }

            let mut keys = BTreeSet::new();
            for asset in &stage.assets {
                if !keys.insert(asset.key.as_str()) {
                    warnings.push(ManifestWarning::DuplicateAssetKey {
                        stage: stage.id.clone(),
                        key: asset.key.clone(),
                    });
                }
            }

            for (index, activity) in stage.activities.iter().enumerate() {
                if !ACTIVITY_KINDS.contains(&activity.kind.as_str()) {
                    warnings.push(ManifestWarning::UnknownActivityKind {
                        stage: stage.id.clone(),
                        index,
                        kind: activity.kind.clone(),
                    });
                }

                if let Some(limit) = activity.time_limit
                    && !(limit > 0.0)
                {
                    warnings.push(ManifestWarning::InvalidTimeLimit {
                        stage: stage.id.clone(),
                        index,
                        value: limit,
                    });
                }
            }
        }

        warnings
    }

    /// 加载并验证，警告写入日志
    pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let manifest = Self::load(path)?;

        for warning in manifest.validate() {
            warn!(warning = %warning, "Manifest 警告");
        }

        Ok(manifest)
    }

    /// 阶段总步骤数
    pub fn total_steps(&self) -> usize {
        self.stages.iter().map(StageDescriptor::step_count).sum()
    }
}
