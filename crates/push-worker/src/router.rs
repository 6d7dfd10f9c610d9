//! 事件路由
//!
//! 将通道负载解析为类型化事件并执行对应动作：test/manual 只记日志，
//! sold 走解析归属 -> 查令牌 -> 推送的完整链路。所有查询和推送失败
//! 都在调用点捕获并记录，绝不向监听循环传播。

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::dispatcher::{PushMessage, PushSender};
use crate::event::ChannelEvent;
use crate::repository::{AnnouncementStore, UserDirectory};

/// 售出事件推送正文
pub const SOLD_BODY: &str = "Il tuo annuncio è stato acquistato subito!";

/// 单条事件的处理结果
///
/// Router 把每条事件的失败都收敛为一个结果变体而非错误，
/// 监听循环只做日志记录，不做任何恢复动作。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// 自检事件已确认收到
    SelfTest,
    /// 人工诊断事件已确认收到
    Manual,
    /// 推送已提交，附推送服务分配的消息标识
    Pushed { message_id: String },
    /// 公告不存在，事件终止
    SubjectMissing,
    /// 用户无注册令牌，静默跳过
    TokenAbsent,
    /// 未识别的事件类型，惰性忽略
    Ignored,
    /// 查询或推送失败，事件被放弃
    Failed,
}

/// 事件路由器
///
/// 通过构造注入持有三个下游依赖，全部为 trait object：
/// Router 会被监听循环的多个并发任务共享，trait object 避免泛型
/// 传播到整个调用链。
pub struct EventRouter {
    announcements: Arc<dyn AnnouncementStore>,
    users: Arc<dyn UserDirectory>,
    sender: Arc<dyn PushSender>,
}

impl EventRouter {
    pub fn new(
        announcements: Arc<dyn AnnouncementStore>,
        users: Arc<dyn UserDirectory>,
        sender: Arc<dyn PushSender>,
    ) -> Self {
        Self {
            announcements,
            users,
            sender,
        }
    }

    /// 处理一条原始通道负载
    ///
    /// 本方法永不返回错误：每条事件的失败完全包含在对该事件的处理中。
    pub async fn handle_payload(&self, payload: &str) -> HandleOutcome {
        match ChannelEvent::parse(payload) {
            ChannelEvent::Test { nonce } => {
                info!(nonce = %nonce, "收到自检事件");
                HandleOutcome::SelfTest
            }
            ChannelEvent::Manual { raw } => {
                info!(payload = %raw, "收到人工诊断事件");
                HandleOutcome::Manual
            }
            ChannelEvent::Sold { announcement_id } => self.handle_sold(&announcement_id).await,
            ChannelEvent::Unknown { raw } => {
                warn!(payload = %raw, "收到未识别的事件类型，忽略");
                HandleOutcome::Ignored
            }
        }
    }

    /// 处理售出事件：解析归属 -> 查令牌 -> 推送
    async fn handle_sold(&self, announcement_id: &str) -> HandleOutcome {
        let Ok(announcement_id) = announcement_id.parse::<i64>() else {
            warn!(announcement_id = %announcement_id, "公告标识不是合法整数，事件丢弃");
            return HandleOutcome::Failed;
        };

        info!(announcement_id, "售出事件，解析公告归属");

        let owner_id = match self.announcements.find_owner(announcement_id).await {
            Ok(Some(owner_id)) => owner_id,
            Ok(None) => {
                warn!(announcement_id, "公告不存在，不发推送");
                return HandleOutcome::SubjectMissing;
            }
            Err(e) => {
                error!(announcement_id, error = %e, "查询公告归属失败，放弃当前事件");
                return HandleOutcome::Failed;
            }
        };

        let token = match self.users.find_device_token(owner_id).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                info!(user_id = owner_id, "用户无注册设备令牌，跳过推送");
                return HandleOutcome::TokenAbsent;
            }
            Err(e) => {
                error!(user_id = owner_id, error = %e, "查询设备令牌失败，放弃当前事件");
                return HandleOutcome::Failed;
            }
        };

        let message = PushMessage::new(SOLD_BODY, token);
        match self.sender.send(owner_id, &message).await {
            Ok(message_id) => {
                info!(user_id = owner_id, message_id = %message_id, "售出推送已提交");
                HandleOutcome::Pushed { message_id }
            }
            Err(e) => {
                error!(user_id = owner_id, error = %e, "推送提交失败，事件丢失");
                HandleOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{MockPushSender, PUSH_TITLE};
    use crate::error::PushWorkerError;
    use crate::repository::{MockAnnouncementStore, MockUserDirectory};
    use swap_shared::error::SwapError;

    /// 组装一个全部依赖都是 mock 的 Router
    fn make_router(
        announcements: MockAnnouncementStore,
        users: MockUserDirectory,
        sender: MockPushSender,
    ) -> EventRouter {
        EventRouter::new(Arc::new(announcements), Arc::new(users), Arc::new(sender))
    }

    /// 所有 mock 都不设预期且标记 never：任何调用都会使测试失败
    fn make_inert_router() -> EventRouter {
        let mut announcements = MockAnnouncementStore::new();
        announcements.expect_find_owner().never();
        let mut users = MockUserDirectory::new();
        users.expect_find_device_token().never();
        let mut sender = MockPushSender::new();
        sender.expect_send().never();
        make_router(announcements, users, sender)
    }

    #[tokio::test]
    async fn test_test_event_triggers_nothing() {
        let router = make_inert_router();
        let outcome = router.handle_payload("test:9876").await;
        assert_eq!(outcome, HandleOutcome::SelfTest);
    }

    #[tokio::test]
    async fn test_manual_event_triggers_nothing() {
        let router = make_inert_router();
        let outcome = router.handle_payload("manual:verifica").await;
        assert_eq!(outcome, HandleOutcome::Manual);
    }

    #[tokio::test]
    async fn test_unknown_kind_triggers_nothing() {
        let router = make_inert_router();
        let outcome = router.handle_payload("foo:123").await;
        assert_eq!(outcome, HandleOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_sold_event_end_to_end() {
        // 公告 42 归属用户 7，用户 7 注册了令牌 tok-abc
        let mut announcements = MockAnnouncementStore::new();
        announcements
            .expect_find_owner()
            .withf(|id| *id == 42)
            .times(1)
            .returning(|_| Ok(Some(7)));

        let mut users = MockUserDirectory::new();
        users
            .expect_find_device_token()
            .withf(|id| *id == 7)
            .times(1)
            .returning(|_| Ok(Some("tok-abc".to_string())));

        let mut sender = MockPushSender::new();
        sender
            .expect_send()
            .withf(|user_id, message| {
                *user_id == 7
                    && message.title == PUSH_TITLE
                    && message.body == SOLD_BODY
                    && message.token == "tok-abc"
            })
            .times(1)
            .returning(|_, _| Ok("0:msg-001".to_string()));

        let router = make_router(announcements, users, sender);
        let outcome = router.handle_payload("sold:42").await;
        assert_eq!(
            outcome,
            HandleOutcome::Pushed {
                message_id: "0:msg-001".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_sold_event_subject_missing() {
        let mut announcements = MockAnnouncementStore::new();
        announcements
            .expect_find_owner()
            .times(1)
            .returning(|_| Ok(None));

        let mut users = MockUserDirectory::new();
        users.expect_find_device_token().never();
        let mut sender = MockPushSender::new();
        sender.expect_send().never();

        let router = make_router(announcements, users, sender);
        let outcome = router.handle_payload("sold:9999").await;
        assert_eq!(outcome, HandleOutcome::SubjectMissing);
    }

    #[tokio::test]
    async fn test_sold_event_token_absent() {
        let mut announcements = MockAnnouncementStore::new();
        announcements
            .expect_find_owner()
            .times(1)
            .returning(|_| Ok(Some(7)));

        let mut users = MockUserDirectory::new();
        users
            .expect_find_device_token()
            .times(1)
            .returning(|_| Ok(None));

        let mut sender = MockPushSender::new();
        sender.expect_send().never();

        let router = make_router(announcements, users, sender);
        let outcome = router.handle_payload("sold:42").await;
        assert_eq!(outcome, HandleOutcome::TokenAbsent);
    }

    #[tokio::test]
    async fn test_sold_event_lookup_error_is_contained() {
        let mut announcements = MockAnnouncementStore::new();
        announcements
            .expect_find_owner()
            .times(1)
            .returning(|_| Err(SwapError::Database(sqlx::Error::PoolTimedOut)));

        let mut users = MockUserDirectory::new();
        users.expect_find_device_token().never();
        let mut sender = MockPushSender::new();
        sender.expect_send().never();

        let router = make_router(announcements, users, sender);
        let outcome = router.handle_payload("sold:42").await;
        assert_eq!(outcome, HandleOutcome::Failed);
    }

    #[tokio::test]
    async fn test_sold_event_non_numeric_id() {
        let router = make_inert_router();
        let outcome = router.handle_payload("sold:abc").await;
        assert_eq!(outcome, HandleOutcome::Failed);
    }

    #[tokio::test]
    async fn test_dispatch_failure_does_not_impair_next_event() {
        // 第一条事件推送失败，第二条独立事件必须完整走完全部流程
        let mut announcements = MockAnnouncementStore::new();
        announcements
            .expect_find_owner()
            .times(2)
            .returning(|_| Ok(Some(7)));

        let mut users = MockUserDirectory::new();
        users
            .expect_find_device_token()
            .times(2)
            .returning(|_| Ok(Some("tok-abc".to_string())));

        let mut sender = MockPushSender::new();
        let mut seq = mockall::Sequence::new();
        sender
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|user_id, _| {
                Err(PushWorkerError::Dispatch {
                    user_id,
                    reason: "quota exceeded".to_string(),
                })
            });
        sender
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("0:msg-002".to_string()));

        let router = make_router(announcements, users, sender);

        let first = router.handle_payload("sold:42").await;
        assert_eq!(first, HandleOutcome::Failed);

        let second = router.handle_payload("sold:43").await;
        assert_eq!(
            second,
            HandleOutcome::Pushed {
                message_id: "0:msg-002".to_string()
            }
        );
    }
}
