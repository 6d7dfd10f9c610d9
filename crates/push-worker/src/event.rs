//! 通道事件解析
//!
//! NOTIFY 负载约定为 UTF-8 字符串 `"<kind>:<argument>"`，只有第一个冒号
//! 是分隔符，argument 内部允许再出现冒号。把字符串前缀判断替换为封闭的
//! 枚举解析，Router 对其做穷尽匹配；未识别的 kind 映射到显式的 Unknown
//! 变体而非静默忽略。

/// 解析后的通道事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// 自检事件，由 Self-Test Probe 发出，仅记录日志
    Test { nonce: String },
    /// 人工诊断事件，仅记录日志
    Manual { raw: String },
    /// 售出事件，argument 为公告标识
    Sold { announcement_id: String },
    /// 未识别的事件类型，惰性处理：记录后丢弃，不算错误
    Unknown { raw: String },
}

impl ChannelEvent {
    /// 按第一个冒号拆分负载并分类
    ///
    /// 不含冒号的负载归入 Unknown。
    pub fn parse(payload: &str) -> Self {
        let Some((kind, argument)) = payload.split_once(':') else {
            return Self::Unknown {
                raw: payload.to_string(),
            };
        };

        match kind {
            "test" => Self::Test {
                nonce: argument.to_string(),
            },
            "manual" => Self::Manual {
                raw: argument.to_string(),
            },
            "sold" => Self::Sold {
                announcement_id: argument.to_string(),
            },
            _ => Self::Unknown {
                raw: payload.to_string(),
            },
        }
    }
}
