pub mod events;
pub mod gitshot;
pub mod runs;

/// GET /healthz
pub async fn healthz() -> &'static str {
    "ok"
}
