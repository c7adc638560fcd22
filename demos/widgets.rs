//! A small widget catalogue served by keel.
//!
//! Run with:
//!   RUST_LOG=info KEEL_PROBLEM_TYPE_PREFIX=https://errors.example.com cargo run --example widgets
//!
//! Try:
//!   curl -i http://localhost:3000/widgets/1
//!   curl -i http://localhost:3000/widgets/99
//!   curl -i -X POST http://localhost:3000/widgets \
//!        -H 'content-type: application/json' \
//!        -H 'x-api-key: demo' \
//!        -d '{"name":"sprocket","price":12}'
//!   curl -i -X POST http://localhost:3000/widgets \
//!        -H 'content-type: application/json' \
//!        -H 'x-api-key: demo' \
//!        -d '{"name":"x","price":12}'
//!   curl -i -X PATCH http://localhost:3000/widgets/1

use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use http::StatusCode;
use keel::{Config, Container, Context, DispatchBuilder, InvalidField, Route, Server, Validate};
use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize)]
struct Widget {
    #[serde(default)]
    id: u64,
    name: String,
    price: u32,
}

impl Validate for Widget {
    fn validate(&self) -> Result<(), InvalidField> {
        if self.name.trim().len() < 3 {
            return Err(InvalidField::new("name", "must be at least 3 characters"));
        }
        if self.price == 0 {
            return Err(InvalidField::new("price", "must be positive"));
        }
        Ok(())
    }
}

/// In-memory store shared by every request.
#[derive(Default)]
struct Catalogue {
    next_id: AtomicU64,
    widgets: Mutex<BTreeMap<u64, Widget>>,
}

impl Catalogue {
    fn seeded() -> Self {
        let catalogue = Self::default();
        catalogue.insert(Widget { id: 0, name: "flange".into(), price: 4 });
        catalogue
    }

    fn insert(&self, mut widget: Widget) -> Widget {
        widget.id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut widgets = self.widgets.lock().unwrap_or_else(|e| e.into_inner());
        widgets.insert(widget.id, widget.clone());
        widget
    }

    fn get(&self, id: u64) -> Option<Widget> {
        self.widgets.lock().unwrap_or_else(|e| e.into_inner()).get(&id).cloned()
    }
}

#[derive(Clone)]
struct ApiKey(String);

fn require_api_key(ctx: &mut Context) -> ControlFlow<()> {
    match ctx.header("x-api-key").map(str::to_owned) {
        Some(key) => {
            ctx.insert_artifact(ApiKey(key));
            ControlFlow::Continue(())
        }
        None => {
            ctx.respond(StatusCode::UNAUTHORIZED);
            ControlFlow::Break(())
        }
    }
}

// GET /widgets/{id}
fn get_widget(ctx: &mut Context) {
    let Some(catalogue) = ctx.resolve::<Catalogue>() else { return };
    let id = ctx.path_param("id").to_owned();

    match id.parse().ok().and_then(|id| catalogue.get(id)) {
        Some(widget) => ctx.respond_with_json(StatusCode::OK, &widget),
        None => ctx.not_found("Widget", &id),
    }
}

// POST /widgets
fn create_widget(ctx: &mut Context) {
    let Some(widget) = ctx.from_json::<Widget>() else { return };
    let Some(catalogue) = ctx.resolve::<Catalogue>() else { return };

    let created = catalogue.insert(widget);
    if let Some(ApiKey(key)) = ctx.artifact::<ApiKey>() {
        tracing::info!(id = created.id, api_key = %key, "widget created");
    }

    ctx.respond_with_json(StatusCode::CREATED, &created);
}

#[tokio::main]
async fn main() -> Result<(), keel::Error> {
    tracing_subscriber::fmt::init();

    let mut container = Container::new();
    container.register_instance(Arc::new(Catalogue::seeded()));

    let dispatcher = DispatchBuilder::new(container, Config::from_env()?)
        .route(Route::get("/widgets/{id}", get_widget))
        .route(Route::post("/widgets", create_widget).with(require_api_key))
        .build()?;

    Server::bind(([0, 0, 0, 0], 3000)).serve(dispatcher).await
}
