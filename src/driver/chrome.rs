//! Headless Chrome 驱动
//!
//! 需启用 feature "browser" 且系统已安装 Chrome/Chromium。
//! 一个 ChromeEngine 对应一个浏览器进程；每个会话是独立的 BrowserContext（cookie 互相隔离）里的一个 Tab。
//! headless_chrome 是同步 API，所有调用都放进 spawn_blocking。
//! 会话快照是 cookie 列表的 JSON。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use headless_chrome::protocol::cdp::Network::CookieParam;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;

use crate::driver::{BrowserEngine, Locator, PageDriver};
use crate::session::SessionHandle;

/// 浏览器启动参数（对应配置 [browser] 段）
#[derive(Debug, Clone)]
pub struct ChromeOptions {
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for ChromeOptions {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            window_width: 1280,
            window_height: 900,
        }
    }
}

async fn blocking<T, F>(f: F) -> Result<T, String>
where
    F: FnOnce() -> Result<T, String> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| format!("Task join: {}", e))?
}

/// 选择器转成 JS 字符串字面量
fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// 执行返回 JSON 字符串的脚本并解析
fn eval_json(tab: &Tab, js: &str) -> Result<Value, String> {
    let remote = tab
        .evaluate(js, false)
        .map_err(|e| format!("Evaluate failed: {}", e))?;
    match remote.value {
        Some(Value::String(raw)) => {
            serde_json::from_str(&raw).map_err(|e| format!("Bad script result: {}", e))
        }
        Some(other) => Ok(other),
        None => Ok(Value::Null),
    }
}

pub struct ChromeEngine {
    browser: Arc<Browser>,
}

impl ChromeEngine {
    /// 启动浏览器进程
    pub async fn launch(options: ChromeOptions) -> Result<Self, String> {
        let browser = blocking(move || {
            let launch = LaunchOptions::default_builder()
                .headless(options.headless)
                .window_size(Some((options.window_width, options.window_height)))
                .path(options.chrome_path.clone())
                // 等待登录或长回复期间浏览器可能长时间无事件
                .idle_browser_timeout(Duration::from_secs(3600))
                .build()
                .map_err(|e| format!("Invalid launch options: {}", e))?;
            Browser::new(launch)
                .map_err(|e| format!("Chrome launch failed: {}. Install Chrome/Chromium.", e))
        })
        .await?;
        tracing::info!(headless = options.headless, "Chrome launched");
        Ok(Self {
            browser: Arc::new(browser),
        })
    }
}

#[async_trait]
impl BrowserEngine for ChromeEngine {
    async fn open_session(
        &self,
        agent_id: &str,
        restore: Option<SessionHandle>,
    ) -> Result<Box<dyn PageDriver>, String> {
        let browser = Arc::clone(&self.browser);
        let tab = blocking(move || {
            let context = browser
                .new_context()
                .map_err(|e| format!("Browser context failed: {}", e))?;
            let tab = context
                .new_tab()
                .map_err(|e| format!("Browser tab failed: {}", e))?;
            if let Some(handle) = restore {
                let cookies = decode_cookies(handle.as_str())?;
                if !cookies.is_empty() {
                    tab.set_cookies(cookies)
                        .map_err(|e| format!("Restore cookies failed: {}", e))?;
                }
            }
            Ok(tab)
        })
        .await?;
        tracing::debug!(agent = agent_id, "Chrome session opened");
        Ok(Box::new(ChromePage { tab }))
    }
}

/// 快照里的 cookie 转成可回放的 CookieParam；partitionKey 在两种类型里形状不同，丢弃
fn decode_cookies(raw: &str) -> Result<Vec<CookieParam>, String> {
    let cookies: Vec<Value> =
        serde_json::from_str(raw).map_err(|e| format!("Corrupt session data: {}", e))?;
    cookies
        .into_iter()
        .map(|mut c| {
            if let Some(obj) = c.as_object_mut() {
                obj.remove("partitionKey");
            }
            serde_json::from_value(c).map_err(|e| format!("Corrupt cookie: {}", e))
        })
        .collect()
}

pub struct ChromePage {
    tab: Arc<Tab>,
}

impl ChromePage {
    async fn with_tab<T, F>(&self, f: F) -> Result<T, String>
    where
        F: FnOnce(&Tab) -> Result<T, String> + Send + 'static,
        T: Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        blocking(move || f(&*tab)).await
    }
}

#[async_trait]
impl PageDriver for ChromePage {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), String> {
        let url = url.to_string();
        self.with_tab(move |tab| {
            tab.set_default_timeout(timeout);
            tab.navigate_to(&url)
                .map_err(|e| format!("Navigate failed: {}", e))?
                .wait_until_navigated()
                .map_err(|e| format!("Navigate failed: {}", e))?;
            Ok(())
        })
        .await
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<(), String> {
        self.with_tab(move |tab| {
            let deadline = Instant::now() + timeout;
            loop {
                let state = tab
                    .evaluate("document.readyState", false)
                    .map_err(|e| format!("Evaluate failed: {}", e))?
                    .value;
                if state.as_ref().and_then(Value::as_str) == Some("complete") {
                    return Ok(());
                }
                if Instant::now() >= deadline {
                    return Err(format!(
                        "Page not ready: timed out after {}ms",
                        timeout.as_millis()
                    ));
                }
                std::thread::sleep(Duration::from_millis(100));
            }
        })
        .await
    }

    async fn wait_for_locator(&self, locator: &Locator, timeout: Duration) -> Result<(), String> {
        let selector = locator.as_str().to_string();
        self.with_tab(move |tab| {
            tab.wait_for_element_with_custom_timeout(&selector, timeout)
                .map(|_| ())
                .map_err(|e| format!("Element {} not found: {}", selector, e))
        })
        .await
    }

    async fn click(&self, locator: &Locator) -> Result<(), String> {
        let selector = locator.as_str().to_string();
        self.with_tab(move |tab| {
            tab.find_element(&selector)
                .map_err(|e| format!("Element {} not found: {}", selector, e))?
                .click()
                .map_err(|e| format!("Click failed: {}", e))?;
            Ok(())
        })
        .await
    }

    async fn fill(&self, locator: &Locator, text: &str) -> Result<(), String> {
        let selector = locator.as_str().to_string();
        let text = text.to_string();
        self.with_tab(move |tab| {
            // textarea 与 contenteditable 都先清空
            let clear = format!(
                r#"(() => {{
                    const el = document.querySelector({sel});
                    if (!el) return JSON.stringify(false);
                    if ('value' in el) {{ el.value = ''; }} else {{ el.textContent = ''; }}
                    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                    return JSON.stringify(true);
                }})()"#,
                sel = js_string(&selector)
            );
            if eval_json(tab, &clear)? != Value::Bool(true) {
                return Err(format!("Element {} not found", selector));
            }
            if !text.is_empty() {
                tab.find_element(&selector)
                    .map_err(|e| format!("Element {} not found: {}", selector, e))?
                    .type_into(&text)
                    .map_err(|e| format!("Typing failed: {}", e))?;
            }
            Ok(())
        })
        .await
    }

    async fn query_all_text(&self, locator: &Locator) -> Result<Vec<String>, String> {
        let selector = locator.as_str().to_string();
        self.with_tab(move |tab| {
            let js = format!(
                "JSON.stringify(Array.from(document.querySelectorAll({})).map(e => e.innerText || e.textContent || ''))",
                js_string(&selector)
            );
            serde_json::from_value(eval_json(tab, &js)?)
                .map_err(|e| format!("Bad script result: {}", e))
        })
        .await
    }

    async fn text_content(&self, locator: &Locator) -> Result<Option<String>, String> {
        let selector = locator.as_str().to_string();
        self.with_tab(move |tab| {
            let js = format!(
                r#"(() => {{
                    const all = document.querySelectorAll({});
                    return JSON.stringify(all.length ? all[all.length - 1].textContent : null);
                }})()"#,
                js_string(&selector)
            );
            serde_json::from_value(eval_json(tab, &js)?)
                .map_err(|e| format!("Bad script result: {}", e))
        })
        .await
    }

    async fn snapshot_session(&self) -> Result<SessionHandle, String> {
        self.with_tab(|tab| {
            let cookies = tab
                .get_cookies()
                .map_err(|e| format!("Read cookies failed: {}", e))?;
            serde_json::to_string(&cookies)
                .map(SessionHandle::new)
                .map_err(|e| format!("Serialize cookies failed: {}", e))
        })
        .await
    }

    async fn close(&self) -> Result<(), String> {
        self.with_tab(|tab| {
            tab.close(true)
                .map(|_| ())
                .map_err(|e| format!("Close failed: {}", e))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string_escapes_quotes() {
        assert_eq!(js_string("button[aria-label='Send']"), "\"button[aria-label='Send']\"");
        assert_eq!(js_string("a\"b"), "\"a\\\"b\"");
    }

    #[test]
    fn test_decode_cookies_rejects_garbage() {
        assert!(decode_cookies("not json").is_err());
        assert!(decode_cookies("[]").unwrap().is_empty());
    }

    #[test]
    fn test_decode_cookies_drops_partition_key() {
        let raw = r#"[{"name":"sid","value":"abc","domain":".claude.ai","path":"/","partitionKey":"x"}]"#;
        let cookies = decode_cookies(raw).unwrap();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].name, "sid");
    }
}
