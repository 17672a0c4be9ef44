use tidewire::{handler_fn, Request, Response, Server};
use tracing_subscriber::EnvFilter;

fn inspect(req: &Request) -> Option<Response> {
    let headers: Vec<String> = req
        .headers()
        .iter()
        .map(|(name, value)| format!("{name:?}: {value:?}"))
        .collect();

    let mut cookies: Vec<_> = req.cookies().iter().collect();
    cookies.sort();
    let mut query: Vec<_> = req.query_map().iter().collect();
    query.sort();
    let mut form: Vec<_> = req.post_params().iter().collect();
    form.sort();

    let result = format!(
        r#"{{"method": {:?}, "path": {:?}, "real_path": {:?}, "headers": {{{}}}, "query": {query:?}, "cookies": {cookies:?}, "form": {form:?}, "body": {:?}, "gzip": {}}}"#,
        req.method(),
        req.path(),
        req.real_path(),
        headers.join(", "),
        String::from_utf8_lossy(req.body().unwrap_or(&[])),
        req.accepts_gzip(),
    );

    Some(Response::new().content_type("application/json").body(result))
}

#[tokio::main]
async fn main() -> Result<(), tidewire::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    Server::builder()
        .register_handler("/inspect", handler_fn(inspect))
        .enable_compression()
        .listen_on(8080, None)
        .build()
        .launch()
        .await
}
