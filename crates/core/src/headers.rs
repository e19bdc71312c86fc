use std::collections::BTreeMap;

/// 重试计数头的键名
pub const RETRY_COUNT_HEADER: &str = "retry-count";
/// 请求关联标识头的键名
pub const REQUEST_ID_HEADER: &str = "requestId";

/// 消息头取值的线上表示
///
/// 不同语言栈的生产者写入的 `retry-count` 可能是字节、32位整数、
/// 64位整数或UTF-8字符串，读取侧必须全部兼容。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Byte(u8),
    Int(i32),
    Long(i64),
    Bytes(Vec<u8>),
    Text(String),
}

/// 随消息一起传递的元数据
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageMetadata {
    /// 请求关联标识
    pub request_id: Option<String>,
    /// 跨调用追踪标识
    pub correlation_id: Option<String>,
    /// 其余消息头
    pub headers: BTreeMap<String, HeaderValue>,
}

impl MessageMetadata {
    pub fn for_request(request_id: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
            correlation_id: Some(correlation_id.into()),
            headers: BTreeMap::new(),
        }
    }
}

/// 读取元数据中的重试计数
///
/// 缺失、为空或无法解析时一律按 0 处理；64位值截断到低32位，
/// 负数按 0 处理，任何输入都不会导致错误。
pub fn read_retry_count(metadata: &MessageMetadata) -> u32 {
    match metadata.headers.get(RETRY_COUNT_HEADER) {
        None => 0,
        Some(HeaderValue::Byte(value)) => u32::from(*value),
        Some(HeaderValue::Int(value)) => {
            if *value < 0 {
                0
            } else {
                *value as u32
            }
        }
        Some(HeaderValue::Long(value)) => {
            if *value < 0 {
                0
            } else {
                (*value as u64 & u64::from(u32::MAX)) as u32
            }
        }
        Some(HeaderValue::Bytes(bytes)) => std::str::from_utf8(bytes)
            .ok()
            .and_then(|text| text.trim().parse::<u32>().ok())
            .unwrap_or(0),
        Some(HeaderValue::Text(text)) => text.trim().parse::<u32>().unwrap_or(0),
    }
}

/// 写入下一次发布时携带的重试计数
pub fn write_retry_count(metadata: &mut MessageMetadata, count: u32) {
    metadata
        .headers
        .insert(RETRY_COUNT_HEADER.to_string(), HeaderValue::Int(count as i32));
}
