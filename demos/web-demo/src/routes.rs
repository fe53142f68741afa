use kestrel_validator::{FieldValidator, ValidationError};
use kestrel_web::prelude::*;
use serde_json::Value;

/// 自定义验证器：用户名只允许小写字母和数字
fn validators() -> ValidatorRegistry {
    let mut registry = ValidatorRegistry::new();
    registry.register(
        "username",
        FieldValidator::custom(|value| match value.as_str() {
            Some(name) if is_username(name) => Ok(Value::String(name.to_string())),
            _ => Err(ValidationError::new(
                1100,
                "Only lowercase letters and digits are allowed.",
            )),
        }),
    );
    registry
}

fn is_username(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

pub fn build(upload: &UploadProperties) -> anyhow::Result<RouteTable> {
    let validators = validators();
    let sort = StrRule::new().one_of(&["name", "date"])?;
    let mut routes = RouteTable::new();
    routes.max_file_size(upload.max_file_size);

    routes.kernel_middleware(["timing"]);

    routes.path("/");

    routes
        .path("user/{id}")
        .match_num("id", NumRule::new().min(1))
        .middleware(["load_user"]);

    routes
        .path("register")
        .methods([RequestMethod::Get, RequestMethod::Post])
        .middleware(["csrf"])
        .on(RequestMethod::Post)
        .validate("name", "username", &validators)?
        .match_num("age", NumRule::new().min(0).max(150))
        .match_fn(Handler::new(
            [Param::named("password"), Param::named("password_confirm")],
            |args, _| {
                let password = args.str("password").unwrap_or_default();
                Ok(Reply::Bool(
                    !password.is_empty() && args.str("password_confirm") == Some(password),
                ))
            },
        ))
        .fails(Redirect::to("register").with_input(&["password", "password_confirm"]));

    routes
        .path("search")
        .match_str("q", StrRule::new().max_len(64))
        .match_num("page", NumRule::new().min(1))
        .match_str("filter.sort", sort)
        .controller("UserController", "search");

    routes
        .path("avatar")
        .methods([RequestMethod::Post])
        .match_file(
            "avatar",
            FileRule::new(["image/png", "image/jpeg"])
                .max_file_size(512)
                .empty_able(false),
        );

    routes.group(["auth"], |admin| {
        admin.path("admin/dashboard");
    });

    Ok(routes)
}
