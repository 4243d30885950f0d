//! `api` crate — the Jobmon server's HTTP surface: FSM API (binding and
//! status transitions), CLI/Query API (read-only lookups), and Reaper API
//! (the sweep endpoints the standalone reaper process calls).
//!
//! Every route shares one `AppState` carrying the db pool; errors convert
//! to the `{"error": {"type", "exception_message", "status_code"}}` body
//! via [`error::ApiError`].

pub mod error;
pub mod handlers;

use axum::http::{HeaderName, Request};
use axum::routing::{get, post, put};
use axum::Router;
use db::DbPool;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
}

const REQUEST_ID_HEADER: &str = "x-request-id";

pub async fn serve(bind: &str, pool: DbPool) -> Result<(), std::io::Error> {
    let state = AppState { pool };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let request_id_header = HeaderName::from_static(REQUEST_ID_HEADER);

    let fsm_router = Router::new()
        .route("/tool", post(handlers::fsm::bind_tool))
        .route("/tool_version", post(handlers::fsm::bind_tool_version))
        .route("/task_template", post(handlers::fsm::bind_task_template))
        .route(
            "/task_template_version",
            post(handlers::fsm::bind_task_template_version),
        )
        .route("/array", post(handlers::fsm::bind_array))
        .route("/node", post(handlers::dag::add_nodes))
        .route("/dag", post(handlers::dag::bind_dag))
        .route("/dag/:dag_id/edges", post(handlers::dag::add_edges).get(handlers::dag::get_edges))
        .route("/dag/:dag_id/mark_created", post(handlers::dag::mark_dag_created))
        .route("/task_resources", post(handlers::fsm::bind_task_resources))
        .route(
            "/task/:task_id/task_resources",
            put(handlers::fsm::repoint_task_resources),
        )
        .route(
            "/workflow/:workflow_id/increase_resources",
            post(handlers::fsm::increase_resources),
        )
        .route("/workflow", post(handlers::fsm::bind_workflow))
        .route(
            "/workflow/:workflow_id/ready_to_link",
            get(handlers::fsm::ready_to_link),
        )
        .route("/workflow_run", post(handlers::fsm::create_workflow_run))
        .route(
            "/workflow_run/:id/link",
            post(handlers::fsm::link_workflow_run),
        )
        .route(
            "/workflow_run/:id/heartbeat",
            post(handlers::fsm::log_workflow_run_heartbeat),
        )
        .route("/task", post(handlers::fsm::bind_tasks))
        .route("/task/status", put(handlers::fsm::task_update_statuses))
        .route("/batch", post(handlers::fsm::queue_task_batch))
        .route(
            "/batch/:batch_id/launched",
            put(handlers::fsm::transition_batch_to_launched),
        )
        .route(
            "/task_instance/distributor_ids",
            post(handlers::fsm::log_distributor_ids),
        )
        .route(
            "/task_instance/:id/heartbeat",
            post(handlers::fsm::log_ti_heartbeat),
        )
        .route(
            "/task_instance/:id/triage",
            post(handlers::fsm::request_triage),
        )
        .route(
            "/workflow_run/:workflow_run_id/request_triage",
            post(handlers::fsm::request_triage_for_workflow_run),
        )
        .route(
            "/task_instance/:id/complete",
            post(handlers::fsm::complete_task_instance),
        )
        .route(
            "/task_instance/:id/log_error",
            post(handlers::fsm::log_known_error),
        )
        .route(
            "/task_instance/:id/log_unknown_error",
            post(handlers::fsm::log_unknown_error),
        )
        .route(
            "/distributor_instance",
            post(handlers::fsm::register_distributor_instance),
        )
        .route(
            "/distributor_instance/:id/heartbeat",
            post(handlers::fsm::log_distributor_instance_heartbeat),
        )
        .route(
            "/cluster/:cluster_id/active_distributor_instance",
            get(handlers::fsm::get_active_distributor_instance),
        )
        .route(
            "/workflow_run/:workflow_run_id/batches/unclaimed",
            get(handlers::fsm::get_unclaimed_batches),
        )
        .route("/array/:array_id", get(handlers::fsm::get_array))
        .route(
            "/task_resources/:id",
            get(handlers::fsm::get_task_resources),
        )
        .route("/batch/:batch_id/steps", get(handlers::fsm::get_batch_steps))
        .route(
            "/distributor_instance/:id/active_instances",
            get(handlers::fsm::get_active_instances),
        )
        .route(
            "/distributor_instance/:id/triaging_instances",
            get(handlers::fsm::get_triaging_instances),
        );

    let query_router = Router::new()
        .route("/workflow/:id", get(handlers::query::get_workflow))
        .route("/workflow_run/:id", get(handlers::query::get_workflow_run))
        .route("/task/:id", get(handlers::query::get_task))
        .route(
            "/task/:id/dependencies/down",
            get(handlers::query::task_dependencies_down),
        )
        .route(
            "/task/:id/dependencies/up",
            get(handlers::query::task_dependencies_up),
        )
        .route(
            "/task_instance/:id",
            get(handlers::query::get_task_instance),
        )
        .route(
            "/workflow_run/:workflow_run_id/task_statuses",
            get(handlers::query::task_statuses_for_workflow_run),
        )
        .route(
            "/workflow/:workflow_id/tasks",
            get(handlers::query::list_tasks_for_workflow),
        )
        .route(
            "/workflow/:workflow_id/arrays",
            get(handlers::query::list_arrays_for_workflow),
        );

    let reaper_router = Router::new()
        .route(
            "/workflow_run/lost",
            get(handlers::reaper::get_lost_workflow_runs),
        )
        .route(
            "/workflow_run/:id/reap",
            post(handlers::reaper::reap_workflow_run),
        )
        .route(
            "/workflow/fix_status_inconsistency",
            post(handlers::reaper::fix_status_inconsistency),
        )
        .route(
            "/distributor_instance/sweep_expunged",
            post(handlers::reaper::sweep_expunged_distributors),
        );

    let app = Router::new()
        .nest("/api/v1/fsm", fsm_router)
        .nest("/api/v1/cli", query_router)
        .nest("/api/v1/reaper", reaper_router)
        .layer(SetRequestIdLayer::new(request_id_header.clone(), MakeRequestUuid))
        .layer(PropagateRequestIdLayer::new(request_id_header))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &Request<_>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            },
        ))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("jobmon-server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await
}
