//! # Error 模块
//!
//! 定义 stage-runtime 中使用的错误类型。
//!
//! 注意：活动失败（时间耗尽、未达成目标）是**正常状态**，不是错误，
//! 见 [`crate::activity::ActivityPhase::Failed`]。

use thiserror::Error;

/// 阶段（Stage）错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    /// 资源加载失败（可重试）
    #[error("阶段 '{stage}' 的资源 '{key}' 加载失败 - {message}")]
    AssetLoad {
        stage: String,
        key: String,
        message: String,
    },

    /// 当前阶段状态不允许此操作
    #[error("阶段 '{stage}' 状态不匹配：期望 {expected}，实际 {actual}")]
    InvalidPhase {
        stage: String,
        expected: String,
        actual: String,
    },

    /// 没有可重试的活动
    #[error("阶段 '{stage}' 当前没有等待重试的活动")]
    NothingToRetry { stage: String },
}

/// 活动（Activity）错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActivityError {
    /// 结果已经上报过
    #[error("活动 '{kind}' 的结果已上报，不能重复上报")]
    AlreadyReported { kind: String },

    /// 活动尚未结束
    #[error("活动 '{kind}' 尚未结束（当前状态 {phase}）")]
    NotFinished { kind: String, phase: String },

    /// 状态不允许重新开始
    #[error("活动 '{kind}' 在状态 {phase} 下不能重新开始")]
    CannotRestart { kind: String, phase: String },
}

/// 编排器（Orchestrator）错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    /// 阶段重复注册
    #[error("阶段 '{id}' 已注册")]
    DuplicateStage { id: String },

    /// 阶段未注册
    #[error("阶段 '{id}' 未注册")]
    UnknownStage { id: String },

    /// 阶段顺序规则拒绝进入
    #[error("不允许进入阶段 '{id}'（当前阶段 {current:?}）")]
    EntryDenied { id: String, current: Option<String> },

    /// 没有等待重试的加载
    #[error("没有失败的阶段加载可以重试")]
    NothingToRetry,
}

/// 进度错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProgressError {
    /// 分数增量为负
    #[error("分数增量不能为负：{amount}")]
    NegativeScore { amount: i64 },
}

/// 持久化错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistenceError {
    /// 存储不可用
    #[error("存储不可用: {0}")]
    Unavailable(String),

    /// 序列化/反序列化失败
    #[error("序列化失败: {0}")]
    Serialization(String),

    /// 存档版本不兼容
    #[error("存档版本不兼容: 存档版本 {found} vs 当前版本 {current}")]
    IncompatibleVersion { found: String, current: String },

    /// 文件操作失败
    #[error("文件操作失败: {0}")]
    Io(String),
}

/// 渲染错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// 渲染后端失败
    #[error("渲染后端失败: {0}")]
    Backend(String),
}

/// stage-runtime 统一错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("阶段错误: {0}")]
    Stage(#[from] StageError),

    #[error("活动错误: {0}")]
    Activity(#[from] ActivityError),

    #[error("编排错误: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("进度错误: {0}")]
    Progress(#[from] ProgressError),

    #[error("持久化错误: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("渲染错误: {0}")]
    Render(#[from] RenderError),
}

/// Result 类型别名
pub type RuntimeResult<T> = Result<T, RuntimeError>;
