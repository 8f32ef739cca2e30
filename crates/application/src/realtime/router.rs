//! 事件路由器
//!
//! 解析并执行单个连接发来的命令。同一连接的命令按到达顺序串行处理
//! （由连接的读循环保证，这里不做并发调度）；对外部协作者的每次调用
//! 都套超时，且从不在持有内部锁时发起。任何失败只回发一条 error 事件
//! 给发起连接，绝不终止连接本身。

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use domain::{
    ChatId, ChatStatus, ClientCommand, ConnectionId, MessageContent, ServerEvent, UserIdentity,
};

use crate::error::RealtimeError;
use crate::ports::{ChatDirectory, CollaboratorError, MessageStore};

use super::hub::RealtimeHub;

pub struct EventRouter {
    hub: Arc<RealtimeHub>,
    directory: Arc<dyn ChatDirectory>,
    store: Arc<dyn MessageStore>,
    collaborator_timeout: Duration,
}

impl EventRouter {
    pub fn new(
        hub: Arc<RealtimeHub>,
        directory: Arc<dyn ChatDirectory>,
        store: Arc<dyn MessageStore>,
        collaborator_timeout: Duration,
    ) -> Self {
        Self {
            hub,
            directory,
            store,
            collaborator_timeout,
        }
    }

    /// 处理一条已解析的命令。失败（校验、越权、协作者故障）转成一条
    /// error 事件回发给发起连接，其它订阅者看不到任何痕迹。
    pub async fn handle_command(
        &self,
        connection_id: ConnectionId,
        user: &UserIdentity,
        command: ClientCommand,
    ) {
        let name = command.name();
        if let Err(err) = self.dispatch(connection_id, user, command).await {
            warn!(user_id = %user.user_id, %connection_id, command = name, %err, "command failed");
            self.hub
                .broadcaster()
                .deliver_to_connection(
                    user.user_id,
                    connection_id,
                    ServerEvent::error(err.client_message()),
                )
                .await;
        }
    }

    /// 无法解析的入站帧：只回发一条 error 事件。
    pub async fn handle_malformed(&self, connection_id: ConnectionId, user: &UserIdentity) {
        debug!(user_id = %user.user_id, %connection_id, "malformed client frame");
        self.hub
            .broadcaster()
            .deliver_to_connection(
                user.user_id,
                connection_id,
                ServerEvent::error("malformed command"),
            )
            .await;
    }

    async fn dispatch(
        &self,
        connection_id: ConnectionId,
        user: &UserIdentity,
        command: ClientCommand,
    ) -> Result<(), RealtimeError> {
        match command {
            ClientCommand::GetMyChats => self.get_my_chats(connection_id, user).await,
            ClientCommand::GetChatStatus => self.get_chat_status(connection_id, user).await,
            ClientCommand::SendMessage { chat_id, content } => {
                self.send_message(user, chat_id, content).await
            }
            ClientCommand::Typing { chat_id, is_typing } => {
                self.typing(user, chat_id, is_typing).await
            }
            ClientCommand::MarkRead { chat_id } => self.mark_read(user, chat_id).await,
            ClientCommand::JoinChat { chat_id } => self.join_chat(user, chat_id).await,
            ClientCommand::LeaveChat { chat_id } => self.leave_chat(user, chat_id).await,
        }
    }

    async fn get_my_chats(
        &self,
        connection_id: ConnectionId,
        user: &UserIdentity,
    ) -> Result<(), RealtimeError> {
        let chats = self
            .with_timeout(self.directory.chat_summaries(user.user_id))
            .await??;
        self.hub
            .broadcaster()
            .deliver_to_connection(user.user_id, connection_id, ServerEvent::MyChats { chats })
            .await;
        Ok(())
    }

    async fn get_chat_status(
        &self,
        connection_id: ConnectionId,
        user: &UserIdentity,
    ) -> Result<(), RealtimeError> {
        let chat_ids = self.hub.chats_of(user.user_id).await;
        let mut chats = Vec::with_capacity(chat_ids.len());
        for chat_id in chat_ids {
            let subscribers = self.hub.subscriptions().subscribers_of(chat_id).await;
            let mut online_users = Vec::new();
            for &subscriber in &subscribers {
                if self.hub.presence().is_online(subscriber).await {
                    online_users.push(subscriber);
                }
            }
            chats.push(ChatStatus {
                chat_id,
                subscriber_count: subscribers.len(),
                online_users,
                typing_users: self.hub.typing().typing_users(chat_id).await,
            });
        }
        self.hub
            .broadcaster()
            .deliver_to_connection(
                user.user_id,
                connection_id,
                ServerEvent::ChatStatus { chats },
            )
            .await;
        Ok(())
    }

    async fn send_message(
        &self,
        user: &UserIdentity,
        chat_id: ChatId,
        content: String,
    ) -> Result<(), RealtimeError> {
        let content = MessageContent::new(content)?;
        self.ensure_member(user, chat_id).await?;

        // 先持久化，成功后才扇出：订阅者看到的每条消息都已落库
        let message = self
            .with_timeout(self.store.append(chat_id, user, content))
            .await??;

        self.hub
            .broadcaster()
            .deliver_to_chat(chat_id, &ServerEvent::NewMessage { message }, None)
            .await;
        Ok(())
    }

    async fn typing(
        &self,
        user: &UserIdentity,
        chat_id: ChatId,
        is_typing: bool,
    ) -> Result<(), RealtimeError> {
        if !self
            .hub
            .subscriptions()
            .is_subscribed(user.user_id, chat_id)
            .await
        {
            return Err(RealtimeError::Authorization { chat_id });
        }
        let changed = self
            .hub
            .typing()
            .set_typing(chat_id, user.user_id, is_typing)
            .await;
        if !changed {
            return Ok(());
        }
        let event = if is_typing {
            ServerEvent::UserTyping {
                chat_id,
                user_id: user.user_id,
            }
        } else {
            ServerEvent::UserStoppedTyping {
                chat_id,
                user_id: user.user_id,
            }
        };
        self.hub
            .broadcaster()
            .deliver_to_chat(chat_id, &event, Some(user.user_id))
            .await;
        Ok(())
    }

    async fn mark_read(&self, user: &UserIdentity, chat_id: ChatId) -> Result<(), RealtimeError> {
        self.ensure_member(user, chat_id).await?;
        let read_at = self
            .with_timeout(self.store.mark_read(chat_id, user.user_id))
            .await??;
        self.hub
            .broadcaster()
            .deliver_to_chat(
                chat_id,
                &ServerEvent::MessagesRead {
                    chat_id,
                    user_id: user.user_id,
                    read_at,
                },
                None,
            )
            .await;
        Ok(())
    }

    async fn join_chat(&self, user: &UserIdentity, chat_id: ChatId) -> Result<(), RealtimeError> {
        self.ensure_member(user, chat_id).await?;
        let newly = self
            .hub
            .subscriptions()
            .subscribe(user.user_id, chat_id)
            .await;
        if newly {
            self.hub
                .broadcaster()
                .deliver_to_chat(
                    chat_id,
                    &ServerEvent::UserJoined {
                        chat_id,
                        user_id: user.user_id,
                    },
                    Some(user.user_id),
                )
                .await;
        }
        Ok(())
    }

    /// 只解除本进程的订阅，不触碰聊天成员关系。
    async fn leave_chat(&self, user: &UserIdentity, chat_id: ChatId) -> Result<(), RealtimeError> {
        let removed = self
            .hub
            .subscriptions()
            .unsubscribe(user.user_id, chat_id)
            .await;
        if removed {
            if self.hub.typing().set_typing(chat_id, user.user_id, false).await {
                self.hub
                    .broadcaster()
                    .deliver_to_chat(
                        chat_id,
                        &ServerEvent::UserStoppedTyping {
                            chat_id,
                            user_id: user.user_id,
                        },
                        Some(user.user_id),
                    )
                    .await;
            }
            self.hub
                .broadcaster()
                .deliver_to_chat(
                    chat_id,
                    &ServerEvent::UserLeft {
                        chat_id,
                        user_id: user.user_id,
                    },
                    Some(user.user_id),
                )
                .await;
        }
        Ok(())
    }

    async fn ensure_member(
        &self,
        user: &UserIdentity,
        chat_id: ChatId,
    ) -> Result<(), RealtimeError> {
        let is_member = self
            .with_timeout(self.directory.is_member(user.user_id, chat_id))
            .await??;
        if !is_member {
            return Err(RealtimeError::Authorization { chat_id });
        }
        Ok(())
    }

    async fn with_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, CollaboratorError>>,
    ) -> Result<Result<T, CollaboratorError>, RealtimeError> {
        tokio::time::timeout(self.collaborator_timeout, fut)
            .await
            .map_err(|_| RealtimeError::collaborator("collaborator call timed out"))
    }
}
