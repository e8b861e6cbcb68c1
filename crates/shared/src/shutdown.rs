//! 优雅关闭信号
//!
//! 所有后台循环共享同一个 `watch` channel：主进程把值置为 `true` 即表示关闭。
//! 发送端被丢弃同样视为关闭，避免循环在 `changed()` 持续报错时空转。

use std::time::Duration;

use tokio::sync::watch;

/// 创建关闭信号对
pub fn channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// 是否已经请求关闭
pub fn is_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// 等待指定时长，期间若收到关闭信号则提前返回
///
/// 返回 `true` 表示应当退出循环。
pub async fn sleep_or_shutdown(shutdown: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    if is_requested(shutdown) {
        return true;
    }

    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            // 偏向关闭信号，保证收到关闭时能尽快退出
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return true;
                }
            }

            _ = &mut sleep => return false,
        }
    }
}
