//! 统一错误处理 - 容量规划与配置校验的错误类型

/// 分段哈希表可能发生的错误
#[derive(Debug, thiserror::Error)]
pub enum SegmentError {
    #[error("请求的桶数超出容量规划范围: {requested}")]
    CapacityExceeded { requested: usize },

    #[error("无效配置: {reason}")]
    InvalidConfig { reason: String },
}

impl SegmentError {
    /// 判断错误是否可恢复
    ///
    /// 当前全部错误都在修改容器状态之前返回，容器保持原状态，可继续操作。
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::CapacityExceeded { .. } | Self::InvalidConfig { .. }
        )
    }
}
