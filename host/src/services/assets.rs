//! 文件系统资源服务

use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Component, Path, PathBuf};

use stage_runtime::{AssetHandle, AssetService, AssetStatus};
use tracing::{debug, warn};

/// 每次 `poll` 默认完成的请求数
const DEFAULT_LOADS_PER_POLL: usize = 4;

/// 从资源目录读取文件的资源服务
///
/// 请求先进入队列，`poll` 时按顺序完成，模拟异步加载。
#[derive(Debug)]
pub struct HeadlessAssets {
    root: PathBuf,
    queue: VecDeque<(String, String)>,
    statuses: BTreeMap<String, AssetStatus>,
    loaded: BTreeMap<String, AssetHandle>,
    loads_per_poll: usize,
}

impl HeadlessAssets {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            queue: VecDeque::new(),
            statuses: BTreeMap::new(),
            loaded: BTreeMap::new(),
            loads_per_poll: DEFAULT_LOADS_PER_POLL,
        }
    }

    pub fn with_loads_per_poll(mut self, count: usize) -> Self {
        self.loads_per_poll = count.max(1);
        self
    }

    /// 解析资源路径；拒绝绝对路径和越出资源目录的路径
    fn resolve(&self, path: &str) -> Result<PathBuf, String> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(format!("路径越出资源目录: {}", path));
        }
        Ok(self.root.join(relative))
    }

    fn load_now(&self, key: &str, path: &str) -> Result<AssetHandle, String> {
        let full = self.resolve(path)?;
        let bytes = fs::read(&full).map_err(|e| format!("无法读取 {}: {}", full.display(), e))?;
        Ok(AssetHandle {
            key: key.to_string(),
            path: path.to_string(),
            byte_len: bytes.len(),
        })
    }
}

impl AssetService for HeadlessAssets {
    fn load_image(&mut self, path: &str, key: &str) {
        if matches!(self.statuses.get(key), Some(AssetStatus::Ready)) {
            return;
        }
        debug!(key = %key, path = %path, "请求资源");
        self.statuses.insert(key.to_string(), AssetStatus::Pending);
        self.queue.push_back((key.to_string(), path.to_string()));
    }

    fn status(&self, key: &str) -> AssetStatus {
        self.statuses
            .get(key)
            .cloned()
            .unwrap_or(AssetStatus::Missing)
    }

    fn get_asset(&self, key: &str) -> Option<AssetHandle> {
        self.loaded.get(key).cloned()
    }

    fn poll(&mut self) {
        for _ in 0..self.loads_per_poll {
            let Some((key, path)) = self.queue.pop_front() else {
                break;
            };
            match self.load_now(&key, &path) {
                Ok(handle) => {
                    debug!(key = %key, bytes = handle.byte_len, "资源就绪");
                    self.loaded.insert(key.clone(), handle);
                    self.statuses.insert(key, AssetStatus::Ready);
                }
                Err(message) => {
                    warn!(key = %key, error = %message, "资源加载失败");
                    self.statuses.insert(key, AssetStatus::Failed(message));
                }
            }
        }
    }
}
