//! 示例控制器

use kestrel_web::prelude::*;
use serde_json::Value;
use std::sync::Arc;

/// 内存中的用户目录，作为组件注入
#[derive(Debug)]
pub struct UserDirectory {
    users: Vec<(i64, &'static str, &'static str)>,
}

impl Default for UserDirectory {
    fn default() -> Self {
        Self {
            users: vec![(1, "alice", "alice@example.com"), (2, "bob", "bob@example.com")],
        }
    }
}

impl UserDirectory {
    pub fn find(&self, id: i64) -> Option<Value> {
        self.users
            .iter()
            .find(|(user_id, _, _)| *user_id == id)
            .map(|(id, name, email)| json!({ "id": id, "name": name, "email": email }))
    }

    pub fn search(&self, query: &str) -> Vec<Value> {
        self.users
            .iter()
            .filter(|(_, name, _)| name.contains(query))
            .filter_map(|(id, _, _)| self.find(*id))
            .collect()
    }
}

fn render(
    exchange: &Exchange,
    engine: Option<Arc<TemplateEngine>>,
    template: &str,
    values: InputMap,
) -> DispatchResult<Reply> {
    let engine = engine.ok_or_else(|| {
        ConfigurationError::Template("Template engine is not registered".to_string())
    })?;
    tracing::debug!(template, method = %exchange.request.method(), "Rendering view");
    Ok(View::new().make(&engine, template, &values)?.into())
}

fn index() -> Handler {
    Handler::new([Param::component::<TemplateEngine>()], |args, exchange| {
        let mut values = InputMap::new();
        values.insert("title".into(), json!("Kestrel"));
        if let Some(notice) = exchange.request.flash().get("notice") {
            values.insert("notice".into(), notice.clone());
        }
        render(exchange, args.component::<TemplateEngine>(), "index", values)
    })
}

fn show_user() -> Handler {
    Handler::new([Param::named("user")], |args, _| Ok(args.value("user").clone().into()))
}

fn search_users() -> Handler {
    Handler::new(
        [
            Param::component::<UserDirectory>(),
            Param::named("q"),
            Param::named("page"),
            Param::named("filter"),
        ],
        |args, _| {
            let users = args
                .component::<UserDirectory>()
                .map(|directory| directory.search(args.str("q").unwrap_or_default()))
                .unwrap_or_default();
            Ok(json!({
                "users": users,
                "page": args.value("page"),
                "sort": args.value("filter")["sort"],
            })
            .into())
        },
    )
}

fn register_form() -> Handler {
    Handler::new([Param::component::<TemplateEngine>()], |args, exchange| {
        let flash = exchange.request.flash();
        let mut values = InputMap::new();
        values.insert("errors".into(), object_or_empty(flash.get("ERRORS")));
        values.insert("old".into(), object_or_empty(flash.get("OLD_ARRAY")));
        values.insert("_csrf_field".into(), Value::String(csrf_field(&mut exchange.session)));
        render(exchange, args.component::<TemplateEngine>(), "register", values)
    })
}

fn register() -> Handler {
    Handler::new([Param::named("name")], |args, _| {
        let name = args.str("name").unwrap_or_default();
        tracing::info!(name, "User registered");
        Ok(Redirect::home()
            .with("notice", json!(format!("Welcome, {}!", name)))
            .into())
    })
}

fn upload_avatar() -> Handler {
    Handler::new([Param::named("avatar")], |args, _| {
        let avatar = args.value("avatar");
        Ok(JsonResponse::new(json!({
            "name": avatar["name"],
            "size": avatar["size"],
        }))
        .status(StatusCode::CREATED)
        .into())
    })
}

fn dashboard() -> Handler {
    Handler::new([Param::named("admin")], |args, _| {
        Ok(json!({ "admin": args.bool("admin").unwrap_or(false) }).into())
    })
}

fn object_or_empty(value: Option<&Value>) -> Value {
    match value {
        Some(Value::Object(map)) => Value::Object(map.clone()),
        _ => Value::Object(InputMap::new()),
    }
}

inventory::submit! { ControllerRegistration::new("IndexController", "get", index) }
inventory::submit! { ControllerRegistration::new("UserController", "get", show_user) }
inventory::submit! { ControllerRegistration::new("UserController", "search", search_users) }
inventory::submit! { ControllerRegistration::new("RegisterController", "get", register_form) }
inventory::submit! { ControllerRegistration::new("RegisterController", "post", register) }
inventory::submit! { ControllerRegistration::new("AvatarController", "post", upload_avatar) }
inventory::submit! { ControllerRegistration::new("AdminController", "get", dashboard) }
