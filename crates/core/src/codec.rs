use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::{AnalyzerError, Result};

/// 将消息序列化为UTF-8编码的JSON字节
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(message).map_err(|e| AnalyzerError::Serialization(format!("序列化消息失败: {e}")))
}

/// 从字节载荷反序列化消息
///
/// 字段名大小写不敏感：不同语言栈的生产者可能写出 `jobId`、`JobId`
/// 或 `JOBID`，统一折叠为小写后匹配。只折叠顶层字段名，嵌套的结果
/// 载荷属于工作者，逐字节原样保留。空载荷返回 `Ok(None)`，与格式
/// 损坏（`Decode` 错误）严格区分。
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<Option<T>> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| AnalyzerError::Decode(format!("载荷不是合法的JSON: {e}")))?;

    let folded = fold_top_level_keys(value);
    let message = serde_json::from_value(folded)
        .map_err(|e| AnalyzerError::Decode(format!("载荷结构不匹配: {e}")))?;

    Ok(Some(message))
}

/// 把顶层对象的键折叠为小写，嵌套值不做任何改写
fn fold_top_level_keys(value: Value) -> Value {
    match value {
        Value::Object(entries) => {
            let mut folded = Map::with_capacity(entries.len());
            for (key, inner) in entries {
                folded.insert(key.to_lowercase(), inner);
            }
            Value::Object(folded)
        }
        other => other,
    }
}
