//! Handlers for the JSON endpoints

use std::path::PathBuf;

use tiny_http::Request;

use super::types::{
    ApproveResponse, AskRequest, CreateJobRequest, JobIdResponse, PlanActionRequest, PlanRequest,
};
use super::{
    ServerContext, parse_body, query_param, respond_error, respond_json,
    respond_orchestrator_error,
};
use crate::domain::{JobId, OrchestratorError};

/// Parse the body or answer `400 bad_request`
macro_rules! parse_or_respond {
    ($body:expr, $request:expr) => {
        match parse_body($body) {
            Ok(value) => value,
            Err(message) => {
                respond_error($request, 400, "bad_request", &message);
                return;
            }
        }
    };
}

pub fn health(context: &ServerContext, request: Request) {
    respond_json(request, 200, &context.orchestrator.health());
}

pub fn create_job(context: &ServerContext, body: &str, request: Request) {
    let req: CreateJobRequest = parse_or_respond!(body, request);
    if req.project_path.trim().is_empty() {
        respond_error(request, 400, "bad_request", "project_path is required");
        return;
    }

    let job_id = context
        .orchestrator
        .create_or_reuse_job(PathBuf::from(req.project_path), req.session_id.as_deref());
    respond_json(request, 200, &JobIdResponse { job_id });
}

pub fn ask(context: &ServerContext, body: &str, request: Request) {
    let req: AskRequest = parse_or_respond!(body, request);
    if req.message.trim().is_empty() {
        respond_error(request, 400, "bad_request", "message is required");
        return;
    }
    let Some(job_id) = resolve_job(context, req.job_id, req.project_path, req.session_id) else {
        respond_error(request, 400, "bad_request", "job_id or project_path is required");
        return;
    };

    let outcome = context
        .runtime
        .block_on(context.orchestrator.ask(&job_id, &req.message));
    match outcome {
        Ok(outcome) => respond_json(request, 200, &outcome),
        Err(e) => respond_orchestrator_error(request, &e),
    }
}

pub fn plan(context: &ServerContext, body: &str, request: Request) {
    let req: PlanRequest = parse_or_respond!(body, request);
    if req.objective.trim().is_empty() {
        respond_error(request, 400, "bad_request", "objective is required");
        return;
    }
    let Some(job_id) = resolve_job(context, req.job_id, req.project_path, req.session_id) else {
        respond_error(request, 400, "bad_request", "job_id or project_path is required");
        return;
    };

    let outcome = context.runtime.block_on(context.orchestrator.plan(
        &job_id,
        &req.objective,
        &req.constraints,
    ));
    match outcome {
        Ok(outcome) => respond_json(request, 200, &outcome),
        Err(e) => respond_orchestrator_error(request, &e),
    }
}

pub fn approve(context: &ServerContext, body: &str, request: Request) {
    let req: PlanActionRequest = parse_or_respond!(body, request);
    let result = job_for_plan(context, &req)
        .and_then(|job_id| context.orchestrator.approve(&job_id, &req.plan_id));
    match result {
        Ok(job_id) => respond_json(
            request,
            200,
            &ApproveResponse {
                job_id,
                status: "approved",
            },
        ),
        Err(e) => respond_orchestrator_error(request, &e),
    }
}

pub fn execute(context: &ServerContext, body: &str, request: Request) {
    let req: PlanActionRequest = parse_or_respond!(body, request);
    let _runtime = context.runtime.enter();
    let result = job_for_plan(context, &req)
        .and_then(|job_id| context.orchestrator.execute(&job_id, &req.plan_id));
    match result {
        Ok(job_id) => respond_json(request, 200, &JobIdResponse { job_id }),
        Err(e) => respond_orchestrator_error(request, &e),
    }
}

pub fn job_status(context: &ServerContext, query: &str, request: Request) {
    let Some(job_id) = query_param(query, "job_id") else {
        respond_error(request, 400, "bad_request", "job_id query parameter is required");
        return;
    };
    match context.orchestrator.status(&job_id) {
        Ok(snapshot) => respond_json(request, 200, &snapshot),
        Err(e) => respond_orchestrator_error(request, &e),
    }
}

/// The explicit job, or one created/reused for `project_path`
fn resolve_job(
    context: &ServerContext,
    job_id: Option<JobId>,
    project_path: Option<String>,
    session_id: Option<String>,
) -> Option<JobId> {
    if let Some(job_id) = job_id.filter(|id| !id.trim().is_empty()) {
        return Some(job_id);
    }
    let project_path = project_path.filter(|p| !p.trim().is_empty())?;
    Some(
        context
            .orchestrator
            .create_or_reuse_job(PathBuf::from(project_path), session_id.as_deref()),
    )
}

fn job_for_plan(context: &ServerContext, req: &PlanActionRequest) -> Result<JobId, OrchestratorError> {
    match req.job_id.as_ref().filter(|id| !id.trim().is_empty()) {
        Some(job_id) => Ok(job_id.clone()),
        None => context.orchestrator.find_by_plan_id(&req.plan_id),
    }
}
