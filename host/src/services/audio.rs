//! 日志音频服务

use std::collections::BTreeSet;

use stage_runtime::AudioService;
use tracing::{debug, trace};

/// 把音效请求写入日志的音频服务
///
/// 设置了已知音效集合时，未知音效静默跳过。
#[derive(Debug, Default)]
pub struct LogAudio {
    known: Option<BTreeSet<String>>,
    played: u64,
    skipped: u64,
}

impl LogAudio {
    pub fn with_known_sounds<I, S>(sounds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: Some(sounds.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn played(&self) -> u64 {
        self.played
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl AudioService for LogAudio {
    fn play_sound(&mut self, key: &str) {
        if self.known.as_ref().is_some_and(|known| !known.contains(key)) {
            trace!(key = %key, "音效不存在，跳过");
            self.skipped += 1;
            return;
        }
        debug!(key = %key, "播放音效");
        self.played += 1;
    }
}
