// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Headless browser tool
//!
//! Drives Chromium over the DevTools protocol. One browser and one page
//! persist across calls until the `close` action or [`BrowserSession::close`].

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::{GalError, Result};
use crate::llm::provider::ToolDefinition;
use crate::tools::{
    optional_str, required_str, truncate_chars, ConcurrencyClass, SchemaBuilder, Tool,
    ToolHandler,
};

const MAX_TEXT_CHARS: usize = 4096;
const ELEMENT_TIMEOUT: Duration = Duration::from_secs(10);
const SETTLE_DELAY: Duration = Duration::from_millis(500);
const POLL_INTERVAL: Duration = Duration::from_millis(200);
const DEFAULT_SCREENSHOT_PATH: &str = "/tmp/screenshot.png";
const ACTIONS: &str =
    "navigate, click, fill, select, screenshot, get_text, get_elements, eval, scroll, wait, close";

/// Lists visible interactive elements under an optional root selector.
const ELEMENTS_JS: &str = r#"(sel) => {
    const root = sel ? document.querySelector(sel) : document;
    if (!root) return '(no element matches selector)';
    const tags = ['a','button','input','textarea','select','[role="button"]','[role="tab"]','[role="menuitem"]','[role="link"]','[onclick]','[contenteditable="true"]'];
    const seen = new Set();
    const lines = [];
    const add = (el) => {
        if (seen.has(el)) return;
        seen.add(el);
        if (!el.offsetParent && el.tagName !== 'BODY') return;
        let desc = el.tagName.toLowerCase() + (el.id ? '#' + el.id : '');
        if (typeof el.className === 'string' && el.className.trim()) {
            desc += '.' + el.className.trim().split(/\s+/).join('.');
        }
        const extra = [];
        if (el.type) extra.push('type=' + el.type);
        if (el.placeholder) extra.push('placeholder="' + el.placeholder + '"');
        if (el.name) extra.push('name="' + el.name + '"');
        const text = (el.textContent || '').trim().substring(0, 50);
        if (text) extra.push('"' + text + '"');
        if (el.href) extra.push('href="' + el.href + '"');
        lines.push('[' + (lines.length + 1) + '] ' + desc + (extra.length ? ' ' + extra.join(' ') : ''));
    };
    root.querySelectorAll(tags.join(',')).forEach(add);
    root.querySelectorAll('div,span').forEach((el) => {
        if (seen.has(el) || !el.offsetParent) return;
        const text = el.textContent.trim();
        if (getComputedStyle(el).cursor === 'pointer' && text.length > 0 && text.length < 50) add(el);
    });
    return lines.length ? lines.join('\n') : '(no interactive elements found)';
}"#;

/// One browser action, validated before any browser is launched.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    Navigate { url: String },
    Click { selector: String },
    Fill { selector: String, value: String },
    Select { selector: String, value: String },
    Screenshot { path: String },
    GetText { selector: Option<String> },
    GetElements { selector: Option<String> },
    Eval { expression: String },
    Scroll { up: bool },
    Wait { selector: String, timeout: Duration },
    Close,
}

impl Action {
    fn parse(input: &Value) -> Result<Self> {
        let action = required_str(input, "action")?;
        let selector = || {
            optional_str(input, "selector")
                .map(str::to_string)
                .ok_or_else(|| {
                    GalError::InvalidInput(format!("selector is required for {}", action))
                })
        };
        let value = || input["value"].as_str().unwrap_or_default().to_string();

        Ok(match action {
            "navigate" => Self::Navigate {
                url: optional_str(input, "url")
                    .ok_or_else(|| GalError::InvalidInput("url is required for navigate".to_string()))?
                    .to_string(),
            },
            "click" => Self::Click { selector: selector()? },
            "fill" => Self::Fill {
                selector: selector()?,
                value: value(),
            },
            "select" => Self::Select {
                selector: selector()?,
                value: value(),
            },
            "screenshot" => Self::Screenshot {
                path: optional_str(input, "path")
                    .unwrap_or(DEFAULT_SCREENSHOT_PATH)
                    .to_string(),
            },
            "get_text" => Self::GetText {
                selector: optional_str(input, "selector").map(str::to_string),
            },
            "get_elements" => Self::GetElements {
                selector: optional_str(input, "selector").map(str::to_string),
            },
            "eval" => Self::Eval {
                expression: optional_str(input, "expression")
                    .ok_or_else(|| GalError::InvalidInput("expression is required for eval".to_string()))?
                    .to_string(),
            },
            "scroll" => Self::Scroll {
                up: optional_str(input, "direction") == Some("up"),
            },
            "wait" => Self::Wait {
                selector: selector()?,
                timeout: input["timeout"]
                    .as_u64()
                    .filter(|t| *t > 0)
                    .map_or(ELEMENT_TIMEOUT, Duration::from_secs),
            },
            "close" => Self::Close,
            other => {
                return Err(GalError::InvalidInput(format!(
                    "unknown action: {} (available: {})",
                    other, ACTIONS
                )))
            }
        })
    }
}

fn cdp_error(error: impl std::fmt::Display) -> GalError {
    GalError::ToolExecution(format!("browser: {}", error))
}

/// Quote `text` as a JavaScript string literal.
fn js_string(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}

/// Turn a bare function literal into an invocation; leave expressions alone.
fn eval_source(expression: &str) -> String {
    let trimmed = expression.trim();
    if trimmed.starts_with("function") || (trimmed.starts_with('(') && trimmed.contains("=>")) {
        format!("({})()", trimmed)
    } else {
        trimmed.to_string()
    }
}

fn render_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "undefined".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

struct Session {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

impl Session {
    async fn launch() -> Result<Self> {
        let config = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-blink-features=AutomationControlled")
            .build()
            .map_err(cdp_error)?;
        let (browser, mut events) = Browser::launch(config).await.map_err(cdp_error)?;
        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if event.is_err() {
                    break;
                }
            }
        });
        let page = browser.new_page("about:blank").await.map_err(cdp_error)?;
        tracing::debug!(target: "gal.tools.browser", "browser launched");
        Ok(Self {
            browser,
            page,
            handler,
        })
    }

    async fn shutdown(mut self) {
        if let Err(error) = self.browser.close().await {
            tracing::debug!(target: "gal.tools.browser", %error, "browser close failed");
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
        tracing::debug!(target: "gal.tools.browser", "browser closed");
    }

    async fn evaluate(&self, source: String) -> Result<Option<Value>> {
        let result = self
            .page
            .evaluate_expression(source)
            .await
            .map_err(cdp_error)?;
        Ok(result.value().cloned())
    }

    async fn elements(&self, selector: Option<&str>) -> Result<String> {
        let arg = selector.map_or_else(|| "null".to_string(), js_string);
        let value = self.evaluate(format!("({})({})", ELEMENTS_JS, arg)).await?;
        Ok(render_value(value.as_ref()))
    }

    async fn find(&self, selector: &str, timeout: Duration) -> Result<Element> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.page.find_element(selector).await {
                Ok(element) => return Ok(element),
                Err(_) if tokio::time::Instant::now() < deadline => {
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(_) => {
                    return Err(GalError::ToolExecution(format!(
                        "element not found: {}",
                        selector
                    )))
                }
            }
        }
    }

    async fn current_url(&self) -> String {
        self.page.url().await.ok().flatten().unwrap_or_default()
    }

    async fn run(&self, action: Action) -> Result<String> {
        match action {
            Action::Navigate { url } => {
                self.page.goto(url.as_str()).await.map_err(cdp_error)?;
                tokio::time::sleep(SETTLE_DELAY).await;
                let title = self.page.get_title().await.ok().flatten().unwrap_or_default();
                let elements = self.elements(None).await.unwrap_or_default();
                Ok(format!("[Page: {}]\n[Title: {}]\n{}", url, title, elements))
            }
            Action::Click { selector } => {
                let element = self.find(&selector, ELEMENT_TIMEOUT).await?;
                element.click().await.map_err(cdp_error)?;
                tokio::time::sleep(SETTLE_DELAY).await;
                Ok(format!("clicked {}, current page: {}", selector, self.current_url().await))
            }
            Action::Fill { selector, value } => {
                let element = self.find(&selector, ELEMENT_TIMEOUT).await?;
                element.click().await.map_err(cdp_error)?;
                self.evaluate(format!(
                    "(() => {{ const el = document.querySelector({}); if (el && el.select) el.select(); }})()",
                    js_string(&selector)
                ))
                .await?;
                element.type_str(&value).await.map_err(cdp_error)?;
                Ok(format!("filled {}", selector))
            }
            Action::Select { selector, value } => {
                self.find(&selector, ELEMENT_TIMEOUT).await?;
                let matched = self
                    .evaluate(format!(
                        "(() => {{ const el = document.querySelector({}); const opt = [...el.options].find(o => o.value === {v} || o.text === {v}); if (!opt) return false; el.value = opt.value; el.dispatchEvent(new Event('change', {{ bubbles: true }})); return true; }})()",
                        js_string(&selector),
                        v = js_string(&value)
                    ))
                    .await?;
                if matched != Some(Value::Bool(true)) {
                    return Err(GalError::ToolExecution(format!(
                        "option '{}' not found in {}",
                        value, selector
                    )));
                }
                Ok(format!("selected '{}' in {}", value, selector))
            }
            Action::Screenshot { path } => {
                let data = self
                    .page
                    .screenshot(ScreenshotParams::builder().full_page(true).build())
                    .await
                    .map_err(cdp_error)?;
                tokio::fs::write(&path, &data).await.map_err(|e| {
                    GalError::ToolExecution(format!("Failed to write {}: {}", path, e))
                })?;
                Ok(format!("screenshot saved to {} ({} bytes)", path, data.len()))
            }
            Action::GetText { selector } => {
                let text = match selector {
                    Some(selector) => self
                        .find(&selector, ELEMENT_TIMEOUT)
                        .await?
                        .inner_text()
                        .await
                        .map_err(cdp_error)?
                        .unwrap_or_default(),
                    None => render_value(
                        self.evaluate("document.body.innerText".to_string())
                            .await?
                            .as_ref(),
                    ),
                };
                Ok(truncate_chars(&text, MAX_TEXT_CHARS, "\n...(truncated)"))
            }
            Action::GetElements { selector } => self.elements(selector.as_deref()).await,
            Action::Eval { expression } => {
                let value = self.evaluate(eval_source(&expression)).await?;
                Ok(render_value(value.as_ref()))
            }
            Action::Scroll { up } => {
                let amount = if up { -500 } else { 500 };
                self.evaluate(format!("window.scrollBy(0, {})", amount)).await?;
                Ok(format!("scrolled {}", if up { "up" } else { "down" }))
            }
            Action::Wait { selector, timeout } => {
                self.find(&selector, timeout)
                    .await
                    .map_err(|_| GalError::ToolExecution(format!("timeout waiting for {}", selector)))?;
                Ok(format!("element {} found", selector))
            }
            // Handled by the caller before a session is needed.
            Action::Close => Ok("browser closed".to_string()),
        }
    }
}

/// Shared handle to the lazily launched browser
#[derive(Clone, Default)]
pub struct BrowserSession {
    inner: Arc<Mutex<Option<Session>>>,
}

impl BrowserSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a browser is currently running
    pub async fn is_open(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    /// Shut the browser down if one is running. Returns whether one was.
    pub async fn close(&self) -> bool {
        let session = self.inner.lock().await.take();
        match session {
            Some(session) => {
                session.shutdown().await;
                true
            }
            None => false,
        }
    }
}

/// Tool for headless browser automation
pub struct BrowserTool {
    session: BrowserSession,
}

impl BrowserTool {
    pub fn new(session: BrowserSession) -> Self {
        Self { session }
    }
}

impl Tool for BrowserTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "browser",
            "Headless Chromium browser automation via the Chrome DevTools Protocol. Navigate pages, click, fill forms, extract text, take screenshots, run JavaScript. Elements are targeted by CSS selectors. The session persists across calls: navigate first, then interact.",
            SchemaBuilder::new()
                .string(
                    "action",
                    "Action: navigate, click, fill, select, screenshot, get_text, get_elements, eval, scroll, wait, close",
                    true,
                )
                .string("url", "URL to navigate to (for navigate)", false)
                .string("selector", "CSS selector for the target element", false)
                .string("value", "Value to fill or select", false)
                .string("expression", "JavaScript expression to evaluate (for eval)", false)
                .string("path", "File path for screenshot (default: /tmp/screenshot.png)", false)
                .string_enum("direction", "Scroll direction", &["up", "down"], false)
                .integer("timeout", "Timeout in seconds (for wait, default 10)", false)
                .build(),
        )
    }

    fn concurrency(&self) -> ConcurrencyClass {
        ConcurrencyClass::Mutating
    }
}

#[async_trait]
impl ToolHandler for BrowserTool {
    async fn call(&self, input: Value) -> Result<String> {
        let action = Action::parse(&input)?;
        if action == Action::Close {
            self.session.close().await;
            return Ok("browser closed".to_string());
        }

        let mut guard = self.session.inner.lock().await;
        if guard.is_none() {
            *guard = Some(Session::launch().await?);
        }
        match guard.as_ref() {
            Some(session) => session.run(action).await,
            None => Err(GalError::ToolExecution("browser is not running".to_string())),
        }
    }
}
