//! 入站命令信封
//!
//! 客户端通过 WebSocket 发送 `{"type": <命令名>, "data": {...}}` 形式的
//! JSON。未知的 `type` 会导致反序列化失败，上层将其转换为发给该连接的
//! `error` 事件，而不是关闭连接。

use serde::{Deserialize, Serialize};

use crate::value_objects::ChatId;

/// 客户端入站命令。
///
/// 命令是一次性的：解析、处理、丢弃，从不持久化。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    /// 查询自己所属的聊天及未读数
    GetMyChats,
    /// 查询所属聊天的实时状态（订阅/在线/输入中）
    GetChatStatus,
    /// 发送聊天消息
    SendMessage { chat_id: ChatId, content: String },
    /// 输入状态切换
    Typing { chat_id: ChatId, is_typing: bool },
    /// 将聊天内的消息标记为已读
    MarkRead { chat_id: ChatId },
    /// 订阅一个聊天的实时事件
    JoinChat { chat_id: ChatId },
    /// 取消订阅
    LeaveChat { chat_id: ChatId },
}

impl ClientCommand {
    /// 命令名，用于日志。
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::GetMyChats => "get_my_chats",
            ClientCommand::GetChatStatus => "get_chat_status",
            ClientCommand::SendMessage { .. } => "send_message",
            ClientCommand::Typing { .. } => "typing",
            ClientCommand::MarkRead { .. } => "mark_read",
            ClientCommand::JoinChat { .. } => "join_chat",
            ClientCommand::LeaveChat { .. } => "leave_chat",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn parses_send_message_envelope() {
        let chat_id = Uuid::new_v4();
        let raw = format!(
            r#"{{"type":"send_message","data":{{"chat_id":"{chat_id}","content":"hi"}}}}"#
        );
        let cmd: ClientCommand = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::SendMessage {
                chat_id: ChatId::new(chat_id),
                content: "hi".to_string(),
            }
        );
    }

    #[test]
    fn parses_typing_envelope() {
        let chat_id = Uuid::new_v4();
        let raw = format!(r#"{{"type":"typing","data":{{"chat_id":"{chat_id}","is_typing":true}}}}"#);
        let cmd: ClientCommand = serde_json::from_str(&raw).unwrap();
        assert_eq!(cmd.name(), "typing");
    }

    #[test]
    fn parses_command_without_payload() {
        let cmd: ClientCommand = serde_json::from_str(r#"{"type":"get_my_chats"}"#).unwrap();
        assert_eq!(cmd, ClientCommand::GetMyChats);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let result = serde_json::from_str::<ClientCommand>(r#"{"type":"fly_to_moon","data":{}}"#);
        assert!(result.is_err());
    }
}
