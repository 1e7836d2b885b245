//! # Persistence 模块
//!
//! 进度存档的 JSON 文件实现。
//!
//! ## 文件布局
//!
//! ```text
//! saves/
//! └── progress.json   { "version": {..}, "saved_at": "...", "state": {..} }
//! ```
//!
//! 写入先落到临时文件再重命名，中途崩溃不会留下半个存档。

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stage_runtime::{GameState, PersistenceError, PersistenceService};
use tracing::{debug, info};

/// 存档格式主版本（不兼容变更时递增）
pub const SAVE_VERSION_MAJOR: u32 = 1;
/// 存档格式次版本（向后兼容的新增字段）
pub const SAVE_VERSION_MINOR: u32 = 0;

/// 存档版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveVersion {
    pub major: u32,
    pub minor: u32,
}

impl SaveVersion {
    pub fn current() -> Self {
        Self {
            major: SAVE_VERSION_MAJOR,
            minor: SAVE_VERSION_MINOR,
        }
    }

    /// major 必须相同，minor 可以不同
    pub fn is_compatible(&self) -> bool {
        self.major == SAVE_VERSION_MAJOR
    }
}

impl std::fmt::Display for SaveVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// 磁盘上的存档
///
/// 缺少 `version` 的存档按当前版本读取，缺少 `saved_at` 时为空串。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressFile {
    #[serde(default = "SaveVersion::current")]
    pub version: SaveVersion,
    /// 保存时间（RFC 3339）
    #[serde(default)]
    pub saved_at: String,
    pub state: GameState,
}

impl ProgressFile {
    pub fn new(state: GameState) -> Self {
        Self {
            version: SaveVersion::current(),
            saved_at: chrono::Utc::now().to_rfc3339(),
            state,
        }
    }

    pub fn to_json(&self) -> Result<String, PersistenceError> {
        serde_json::to_string_pretty(self).map_err(|e| PersistenceError::Serialization(e.to_string()))
    }

    /// 解析存档
    ///
    /// 没有 `state` 外层的 JSON 视为直接保存的 [`GameState`]。
    pub fn from_json(json: &str) -> Result<Self, PersistenceError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        let file = if value.get("state").is_some() {
            serde_json::from_value::<ProgressFile>(value)
        } else {
            serde_json::from_value::<GameState>(value).map(|state| ProgressFile {
                version: SaveVersion::current(),
                saved_at: String::new(),
                state,
            })
        }
        .map_err(|e| PersistenceError::Serialization(e.to_string()))?;

        if !file.version.is_compatible() {
            return Err(PersistenceError::IncompatibleVersion {
                found: file.version.to_string(),
                current: SaveVersion::current().to_string(),
            });
        }

        Ok(file)
    }
}

/// JSON 文件持久化
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// 删除存档
    pub fn delete(&self) -> Result<(), PersistenceError> {
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| PersistenceError::Io(e.to_string()))?;
            info!(path = %self.path.display(), "存档已删除");
        }
        Ok(())
    }

    fn ensure_dir(&self) -> Result<(), PersistenceError> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
            && !dir.exists()
        {
            fs::create_dir_all(dir)
                .map_err(|e| PersistenceError::Unavailable(format!("无法创建存档目录: {}", e)))?;
        }
        Ok(())
    }
}

impl PersistenceService for JsonFilePersistence {
    fn save(&mut self, snapshot: &GameState) -> Result<(), PersistenceError> {
        self.ensure_dir()?;

        let json = ProgressFile::new(snapshot.clone()).to_json()?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| PersistenceError::Io(format!("无法写入存档: {}", e)))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| PersistenceError::Io(format!("无法替换存档: {}", e)))?;

        debug!(path = %self.path.display(), "进度已保存");
        Ok(())
    }

    fn load(&mut self) -> Result<Option<GameState>, PersistenceError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&self.path)
            .map_err(|e| PersistenceError::Io(format!("无法读取存档: {}", e)))?;
        let file = ProgressFile::from_json(&json)?;

        info!(
            path = %self.path.display(),
            version = %file.version,
            saved_at = %file.saved_at,
            "进度已读取"
        );
        Ok(Some(file.state))
    }
}
