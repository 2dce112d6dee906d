//! Interactive demo of the navigation engine.
//!
//! Wires a small shop (`root -> product`, `root -> restricted -> cart`,
//! `root -> login`, `root -> notfound`) and reads commands from stdin:
//!
//! - a location token, e.g. `product?p=42` or `cart?s=1&c=1234`
//! - `login?user=ada` to open a session, `logout` to close it
//! - `back` / `forward` to move through history like a browser
//! - `state` to print the active places
//! - `quit`
//!
//! # Environment Variables
//!
//! - `PLACENAV_HISTORY_DEBOUNCE_MS`: history coalescing window (default: 16)
//! - `PLACENAV_FALLBACK_PLACE`: recovery place (default: "notfound")
//! - `RUST_LOG`: Tracing filter (default: "info,placenav=debug")

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};

use placenav::{
    AppHandle, Application, ConstructPresenter, EngineConfig, MemoryHistory, NavigationIntent,
    Place, PlaceRegistry, Presenter, PresenterCore, TraceHook, TypedFactory,
};

/// Owns the session flag every other presenter can consult.
struct RootPresenter {
    core: PresenterCore,
    authenticated: AtomicBool,
    user: Mutex<Option<String>>,
}

#[async_trait]
impl Presenter for RootPresenter {
    fn core(&self) -> &PresenterCore {
        &self.core
    }

    async fn apply_parameters(
        &self,
        _intent: &NavigationIntent,
        initializing: bool,
        _deepest: bool,
    ) -> anyhow::Result<bool> {
        if initializing {
            tracing::info!("root ready");
        }
        Ok(true)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ConstructPresenter for RootPresenter {
    fn construct(app: AppHandle) -> anyhow::Result<Self> {
        Ok(Self {
            core: PresenterCore::new(app),
            authenticated: AtomicBool::new(false),
            user: Mutex::new(None),
        })
    }
}

impl RootPresenter {
    fn lookup(app: &AppHandle) -> Option<Place> {
        app.registry()?.get("root").cloned()
    }
}

struct ProductPresenter {
    core: PresenterCore,
    product: Mutex<Option<i64>>,
}

#[async_trait]
impl Presenter for ProductPresenter {
    fn core(&self) -> &PresenterCore {
        &self.core
    }

    async fn apply_parameters(
        &self,
        intent: &NavigationIntent,
        _initializing: bool,
        deepest: bool,
    ) -> anyhow::Result<bool> {
        if !deepest {
            return Ok(true);
        }
        let id = intent.get_number("p").map(|p| p as i64);
        // Simulated catalog lookup.
        tokio::time::sleep(Duration::from_millis(5)).await;
        *self.product.lock() = id;
        Ok(true)
    }

    fn publish_parameters(&self, intent: &mut NavigationIntent) {
        intent.set_optional("p", *self.product.lock());
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ConstructPresenter for ProductPresenter {
    fn construct(app: AppHandle) -> anyhow::Result<Self> {
        Ok(Self {
            core: PresenterCore::new(app),
            product: Mutex::new(None),
        })
    }
}

/// Redirects to `login` unless the root presenter holds a session.
struct RestrictedPresenter {
    core: PresenterCore,
}

#[async_trait]
impl Presenter for RestrictedPresenter {
    fn core(&self) -> &PresenterCore {
        &self.core
    }

    async fn apply_parameters(
        &self,
        _intent: &NavigationIntent,
        _initializing: bool,
        _deepest: bool,
    ) -> anyhow::Result<bool> {
        let app = self.core.app();
        let authenticated = RootPresenter::lookup(app)
            .and_then(|root| {
                app.with_presenter::<RootPresenter, _>(&root, |p| p.authenticated.load(Ordering::SeqCst))
            })
            .unwrap_or(false);
        if authenticated {
            return Ok(true);
        }
        tracing::info!("not signed in, redirecting to login");
        app.navigate("login").await?;
        Ok(false)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ConstructPresenter for RestrictedPresenter {
    fn construct(app: AppHandle) -> anyhow::Result<Self> {
        Ok(Self {
            core: PresenterCore::new(app),
        })
    }
}

struct CartPresenter {
    core: PresenterCore,
    step: Mutex<Option<i64>>,
    items: Mutex<Vec<String>>,
}

#[async_trait]
impl Presenter for CartPresenter {
    fn core(&self) -> &PresenterCore {
        &self.core
    }

    async fn apply_parameters(
        &self,
        intent: &NavigationIntent,
        _initializing: bool,
        _deepest: bool,
    ) -> anyhow::Result<bool> {
        *self.step.lock() = intent.get_number("s").map(|s| s as i64);
        *self.items.lock() = intent.get_list("c").iter().map(|c| c.encode()).collect();
        Ok(true)
    }

    fn publish_parameters(&self, intent: &mut NavigationIntent) {
        intent.set_optional("s", *self.step.lock());
        let items = self.items.lock().clone();
        if !items.is_empty() {
            intent.set_param("c", items);
        }
    }

    fn compute_derived_fields(&self) {
        tracing::info!("cart holds {} item(s)", self.items.lock().len());
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ConstructPresenter for CartPresenter {
    fn construct(app: AppHandle) -> anyhow::Result<Self> {
        Ok(Self {
            core: PresenterCore::new(app),
            step: Mutex::new(None),
            items: Mutex::new(Vec::new()),
        })
    }
}

/// `login?user=<name>` opens a session on the root presenter.
struct LoginPresenter {
    core: PresenterCore,
}

#[async_trait]
impl Presenter for LoginPresenter {
    fn core(&self) -> &PresenterCore {
        &self.core
    }

    async fn apply_parameters(
        &self,
        intent: &NavigationIntent,
        _initializing: bool,
        deepest: bool,
    ) -> anyhow::Result<bool> {
        let Some(user) = intent.get_str("user").filter(|_| deepest) else {
            return Ok(true);
        };
        let app = self.core.app();
        if let Some(root) = RootPresenter::lookup(app) {
            app.with_presenter::<RootPresenter, _>(&root, |p| {
                p.authenticated.store(true, Ordering::SeqCst);
                *p.user.lock() = Some(user.clone());
            });
        }
        tracing::info!("signed in as {}", user);
        Ok(true)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ConstructPresenter for LoginPresenter {
    fn construct(app: AppHandle) -> anyhow::Result<Self> {
        Ok(Self {
            core: PresenterCore::new(app),
        })
    }
}

struct NotFoundPresenter {
    core: PresenterCore,
}

#[async_trait]
impl Presenter for NotFoundPresenter {
    fn core(&self) -> &PresenterCore {
        &self.core
    }

    async fn apply_parameters(
        &self,
        _intent: &NavigationIntent,
        _initializing: bool,
        _deepest: bool,
    ) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ConstructPresenter for NotFoundPresenter {
    fn construct(app: AppHandle) -> anyhow::Result<Self> {
        Ok(Self {
            core: PresenterCore::new(app),
        })
    }
}

fn wire() -> anyhow::Result<PlaceRegistry> {
    let mut registry = PlaceRegistry::new();
    let root = registry.create("root", TypedFactory::<RootPresenter>::new(), None)?;
    registry.create("product", TypedFactory::<ProductPresenter>::new(), Some(&root))?;
    let restricted = registry.create(
        "restricted",
        TypedFactory::<RestrictedPresenter>::new(),
        Some(&root),
    )?;
    registry.create("cart", TypedFactory::<CartPresenter>::new(), Some(&restricted))?;
    registry.create("login", TypedFactory::<LoginPresenter>::new(), Some(&root))?;
    registry.create("notfound", TypedFactory::<NotFoundPresenter>::new(), Some(&root))?;
    Ok(registry)
}

fn print_state(app: &Application, history: &MemoryHistory, root: &Place) {
    let active: Vec<_> = app
        .active_places()
        .iter()
        .map(|p| p.name().to_string())
        .collect();
    let location = app
        .current_intent()
        .map(|intent| intent.to_token())
        .unwrap_or_default();
    println!("location: {}", location);
    println!("active:   {}", active.join(" > "));
    let user = app
        .with_presenter::<RootPresenter, _>(root, |p| p.user.lock().clone())
        .flatten()
        .unwrap_or_else(|| "(anonymous)".to_string());
    println!("user:     {}", user);
    println!("history:  {:?} (at {})", history.entries(), history.cursor());
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,placenav=debug".into()),
        )
        .init();

    let mut config = EngineConfig::from_env()?;
    if config.fallback_place.is_none() {
        config.fallback_place = Some("notfound".to_string());
    }

    let registry = wire()?;
    let root = registry.require("root")?;
    let history = Arc::new(MemoryHistory::new());
    let app = Application::builder(registry)
        .config(config)
        .debounced_history(Arc::clone(&history))
        .hook(TraceHook)
        .build()?;

    app.start(&root).await?;
    tracing::info!("shop ready; type a location, back, forward, state, logout or quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = line.trim();
        match command {
            "" => continue,
            "quit" | "exit" => break,
            "state" => {}
            "back" => {
                if history.back().is_none() {
                    println!("nothing to go back to");
                }
            }
            "forward" => {
                if history.forward().is_none() {
                    println!("nothing to go forward to");
                }
            }
            "logout" => {
                app.with_presenter::<RootPresenter, _>(&root, |p| {
                    p.authenticated.store(false, Ordering::SeqCst);
                    *p.user.lock() = None;
                });
                println!("signed out");
            }
            token => match app.navigate(token).await {
                Ok(outcome) => tracing::info!("{:?}", outcome),
                Err(err) => println!("error: {}", err),
            },
        }
        // Let history-driven navigation and the debounced push settle.
        tokio::time::sleep(app.config().history_debounce() + Duration::from_millis(20)).await;
        print_state(&app, &history, &root);
    }

    app.shutdown();
    Ok(())
}
