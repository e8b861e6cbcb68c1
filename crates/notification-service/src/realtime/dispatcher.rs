//! 实时投递
//!
//! 尽力而为、不确认、不重试。调用方只记录失败，不因投递失败回滚任何状态。

use tracing::{debug, warn};

use blog_shared::observability::metrics;

use super::registry::{DispatchReport, GroupKey, ServerEvent, SubscriptionRegistry};
use crate::error::{NotificationError, Result};

/// 实时投递接口
#[cfg_attr(test, mockall::automock)]
pub trait RealtimeDispatcher: Send + Sync {
    /// 向分组内所有连接投递事件，返回投递统计
    fn dispatch(&self, group: &GroupKey, event: ServerEvent) -> Result<DispatchReport>;
}

impl RealtimeDispatcher for SubscriptionRegistry {
    fn dispatch(&self, group: &GroupKey, event: ServerEvent) -> Result<DispatchReport> {
        let Some(report) = self.send_to_group(group, &event) else {
            return Err(NotificationError::Dispatch {
                group: group.to_string(),
                message: "订阅注册表已关闭".to_string(),
            });
        };

        if report.delivered > 0 {
            metrics::record_realtime_dispatch("delivered", report.delivered as u64);
        }
        if report.dropped > 0 {
            metrics::record_realtime_dispatch("dropped", report.dropped as u64);
            warn!(
                group = %group,
                event = %event.event,
                dropped = report.dropped,
                "部分连接的出站队列已满或已关闭，事件被丢弃"
            );
        }

        debug!(
            group = %group,
            event = %event.event,
            delivered = report.delivered,
            "实时事件已投递"
        );
        Ok(report)
    }
}
