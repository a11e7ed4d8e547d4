use std::sync::Mutex;

pub const BADGE_COLOR: &str = "#ef4444";
pub const SAVED_NOTICE: &str = "Added to News Brief";

/// Reflects pending-action count and transient confirmations to the user.
pub trait Presenter: Send + Sync {
    fn set_badge(&self, text: &str, color: &str);
    fn notify(&self, text: &str);
}

/// Badge label for `count` pending actions; empty hides the badge.
pub fn badge_text(count: usize) -> String {
    if count > 0 {
        count.to_string()
    } else {
        String::new()
    }
}

/// Presenter for headless runs: logs changes and remembers the last badge.
#[derive(Default)]
pub struct LogPresenter {
    badge: Mutex<String>,
}

impl LogPresenter {
    pub fn badge(&self) -> String {
        self.badge.lock().map(|b| b.clone()).unwrap_or_default()
    }
}

impl Presenter for LogPresenter {
    fn set_badge(&self, text: &str, _color: &str) {
        if let Ok(mut badge) = self.badge.lock() {
            if *badge != text {
                log::info!("Pending actions: {}", if text.is_empty() { "0" } else { text });
                *badge = text.to_string();
            }
        }
    }

    fn notify(&self, text: &str) {
        log::info!("{}", text);
    }
}
