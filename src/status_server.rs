use super::{BoxError, JobHandle, JobRegistry, JobState};
use futures::lock::Mutex;
use hyper::{
    header::CONTENT_TYPE,
    server::Server,
    service::{make_service_fn, service_fn},
    Body, Error as HyperError, Request, Response, StatusCode,
};
use log::info;
use serde::Serialize;
use serde_json::to_string;
use std::{collections::HashMap, convert::Infallible, sync::Arc};

#[derive(Serialize, Eq, PartialEq)]
enum Status {
    Operational,
    Degraded,
    Unrecoverable,
}

/// State of the observed application
///
/// Can be used to manually change the ready-state even though no job has
/// failed.
#[derive(Serialize, Eq, PartialEq, Clone, Copy)]
pub enum State {
    Startup,
    Running,
    Shutdown,
}

impl Status {
    fn status_code(&self) -> StatusCode {
        match *self {
            Status::Operational => StatusCode::OK,
            Status::Degraded => StatusCode::SERVICE_UNAVAILABLE,
            Status::Unrecoverable => StatusCode::GONE,
        }
    }
}

#[derive(Serialize)]
struct JobReport {
    state: String,
    status_message: String,
    errors: Vec<String>,
}

#[derive(Serialize)]
struct StatusResponse<'a> {
    status: &'a Status,
    state: State,
    jobs: HashMap<String, JobReport>,
}

/// HTTP healthcheck server
///
/// Makes the registered job snapshots available as an HTTP endpoint. Commonly
/// used for Kubernetes or Docker health probes. Note that the server does not
/// run itself; submit [`StatusServer::serve`] through a job handle or spawn
/// it on the runtime yourself.
#[derive(Clone)]
pub struct StatusServer {
    jobs: Arc<Mutex<HashMap<String, JobHandle>>>,
    state: Arc<Mutex<State>>,
    port: u16,
}

impl StatusServer {
    /// Creates a new server for the given registry and port configuration
    pub fn new(registry: &JobRegistry, port: u16) -> (Arc<Mutex<State>>, Self) {
        let state = Arc::new(Mutex::new(State::Startup));
        (
            state.clone(),
            Self {
                jobs: registry.jobs.clone(),
                state,
                port,
            },
        )
    }

    async fn generate_report(
        jobs: Arc<Mutex<HashMap<String, JobHandle>>>,
        state: Arc<Mutex<State>>,
        _req: Request<Body>,
    ) -> Result<Response<Body>, Infallible> {
        let jobs = jobs.lock().await;
        let mut status = Status::Operational;
        let mut reports = HashMap::new();

        for (job_name, handle) in jobs.iter() {
            let snapshot = handle.snapshot();

            if snapshot.state == JobState::Failed {
                status = Status::Unrecoverable;
            }

            reports.insert(
                job_name.clone(),
                JobReport {
                    state: format!("{}", snapshot.state),
                    status_message: snapshot.status_message,
                    errors: snapshot.errors,
                },
            );
        }

        let state = state.lock().await;
        if *state != State::Running && status == Status::Operational {
            status = Status::Degraded;
        }

        let status_response = StatusResponse {
            state: *state,
            status: &status,
            jobs: reports,
        };

        let body = to_string(&status_response).unwrap();

        let response = Response::builder()
            .status(status.status_code())
            .header(CONTENT_TYPE, "application/json")
            .body(body.into());

        Ok(response.unwrap())
    }

    /// Serves health reports until the process exits.
    pub async fn serve(self) -> Result<(), BoxError> {
        let jobs = self.jobs.clone();
        let state = self.state.clone();

        let make_svc = make_service_fn(|_conn| {
            let jobs = jobs.clone();
            let state = state.clone();

            async move {
                Ok::<_, HyperError>(service_fn(move |req| {
                    StatusServer::generate_report(jobs.clone(), state.clone(), req)
                }))
            }
        });

        let addr = ([0, 0, 0, 0], self.port).into();
        let server = Server::bind(&addr).serve(make_svc);

        info!("Status server listening on {}", addr);
        server.await.map_err(anyhow::Error::new)?;

        Ok(())
    }
}
