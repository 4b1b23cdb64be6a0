use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use king_sim_back::{
    config::AppConfig,
    dao::sim_store::memory::MemorySimStore,
    routes,
    services::sse_service,
    state::{AppState, SharedState},
};

struct TestApp {
    router: Router,
    token: String,
}

impl TestApp {
    async fn new() -> Self {
        let state: SharedState = AppState::new(AppConfig::default());
        state
            .install_sim_store(Arc::new(MemorySimStore::new()))
            .await;
        let (_receiver, initial) = sse_service::subscribe_facilitator(&state).await.unwrap();
        let handshake: Value = serde_json::from_str(&initial[0].data).unwrap();
        Self {
            router: routes::router(state),
            token: handshake["token"].as_str().unwrap().to_string(),
        }
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        header: Option<(&str, &str)>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((name, value)) = header {
            builder = builder.header(name, value);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    async fn facilitator(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send(method, uri, Some(("X-Facilitator-Token", &self.token)), body)
            .await
    }

    async fn participant(
        &self,
        code: &str,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        self.send(method, uri, Some(("X-Access-Code", code)), body).await
    }
}

fn scenario() -> Value {
    json!({
        "name": "Tuesday cohort",
        "clans": [
            {"name": "Merchants", "color_hex": "#AA8800", "roles": [{"name": "Aria"}, {"name": "Bran"}]},
            {"name": "Priests", "roles": [{"name": "Cato"}, {"name": "Dax"}]}
        ],
        "phases": [
            {"name": "Induction", "default_duration_minutes": 10},
            {"name": "Clan councils", "default_duration_minutes": 20}
        ]
    })
}

#[tokio::test]
async fn facilitator_routes_require_the_console_token() {
    let app = TestApp::new().await;

    let (status, _) = app
        .send(Method::GET, "/facilitator/simulations", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .send(
            Method::GET,
            "/facilitator/simulations",
            Some(("X-Facilitator-Token", "not-the-token")),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["message"].as_str().unwrap().contains("invalid facilitator token"));

    let (status, body) = app
        .facilitator(Method::GET, "/facilitator/simulations", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn participant_routes_require_a_known_access_code() {
    let app = TestApp::new().await;

    let (status, _) = app.send(Method::GET, "/participant/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .participant("ZZZZ9999", Method::GET, "/participant/me", None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_scenarios_are_rejected() {
    let app = TestApp::new().await;
    let (status, _) = app
        .facilitator(
            Method::POST,
            "/facilitator/simulations",
            Some(json!({"name": "   ", "clans": []})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn run_a_yes_no_vote_from_setup_to_announcement() {
    let app = TestApp::new().await;

    let (status, created) = app
        .facilitator(Method::POST, "/facilitator/simulations", Some(scenario()))
        .await;
    assert_eq!(status, StatusCode::OK, "{created}");
    let run_id = created["id"].as_str().unwrap().to_string();
    let phases: Vec<String> = created["phases"]
        .as_array()
        .unwrap()
        .iter()
        .map(|phase| phase["id"].as_str().unwrap().to_string())
        .collect();
    let codes: Vec<String> = created["roles"]
        .as_array()
        .unwrap()
        .iter()
        .map(|role| role["access_code"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(codes.len(), 4);

    let (status, _) = app
        .facilitator(Method::POST, &format!("/facilitator/simulations/{run_id}/load"), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    // Phases run in order.
    let (status, _) = app
        .facilitator(Method::POST, &format!("/facilitator/phases/{}/start", phases[1]), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, started) = app
        .facilitator(Method::POST, &format!("/facilitator/phases/{}/start", phases[0]), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["status"], "active");

    let (_, snapshot) = app.send(Method::GET, "/public/phase", None, None).await;
    assert_eq!(snapshot["current_phase"]["name"], "Induction");
    assert_eq!(snapshot["clock"]["overtime"], false);

    let (status, vote) = app
        .facilitator(
            Method::POST,
            "/facilitator/votes",
            Some(json!({"template_id": "custom_proposal", "proposal_title": "Build a wall?"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{vote}");
    let vote_id = vote["id"].as_str().unwrap().to_string();
    // 10 minute phase minus the 2 minute margin.
    assert_eq!(vote["time_limit_minutes"], 8);

    let (_, open) = app
        .participant(&codes[0], Method::GET, "/participant/votes", None)
        .await;
    assert_eq!(open[0]["has_voted"], false);

    let ballot = json!({"choice": {"kind": "yes_no", "choice": "yes"}});
    let ballot_uri = format!("/participant/votes/{vote_id}");
    let (status, _) = app
        .participant(&codes[0], Method::POST, &ballot_uri, Some(ballot.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .participant(&codes[0], Method::POST, &ballot_uri, Some(ballot))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = app
        .participant(
            &codes[1].to_lowercase(),
            Method::POST,
            &ballot_uri,
            Some(json!({"choice": {"kind": "yes_no", "choice": "no"}})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let result_uri = format!("/participant/votes/{vote_id}/result");
    let (status, _) = app
        .participant(&codes[0], Method::GET, &result_uri, None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, closed) = app
        .facilitator(Method::POST, &format!("/facilitator/votes/{vote_id}/close"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(closed["results"]["yes"], 1);
    assert_eq!(closed["results"]["no"], 1);
    assert_eq!(closed["results"]["passed"], false);
    let (status, _) = app
        .facilitator(Method::POST, &format!("/facilitator/votes/{vote_id}/close"), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .facilitator(Method::POST, &format!("/facilitator/votes/{vote_id}/announce"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, public) = app
        .send(Method::GET, &format!("/public/votes/{vote_id}/result"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(public["status"], "announced");

    let (status, events) = app
        .facilitator(Method::GET, "/facilitator/events", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let kinds: Vec<&str> = events
        .as_array()
        .unwrap()
        .iter()
        .map(|event| event["event_type"].as_str().unwrap())
        .collect();
    assert_eq!(
        kinds,
        [
            "simulation_created",
            "phase_started",
            "vote_opened",
            "vote_closed",
            "vote_announced"
        ]
    );

    let (status, report) = app
        .facilitator(Method::GET, "/facilitator/diagnostics", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["healthy"], true);
}

async fn loaded_run(app: &TestApp) -> (Vec<String>, Vec<String>) {
    let (status, created) = app
        .facilitator(Method::POST, "/facilitator/simulations", Some(scenario()))
        .await;
    assert_eq!(status, StatusCode::OK, "{created}");
    let run_id = created["id"].as_str().unwrap().to_string();
    let (status, _) = app
        .facilitator(Method::POST, &format!("/facilitator/simulations/{run_id}/load"), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let roles = created["roles"].as_array().unwrap();
    let ids = roles
        .iter()
        .map(|role| role["id"].as_str().unwrap().to_string())
        .collect();
    let codes = roles
        .iter()
        .map(|role| role["access_code"].as_str().unwrap().to_string())
        .collect();
    (ids, codes)
}

async fn vote_for(app: &TestApp, vote_id: &str, code: &str, role_id: &str) {
    let (status, body) = app
        .participant(
            code,
            Method::POST,
            &format!("/participant/votes/{vote_id}"),
            Some(json!({"choice": {"kind": "person", "role_id": role_id}})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

#[tokio::test]
async fn election_runoff_and_the_kings_decisions() {
    let app = TestApp::new().await;
    let (roles, codes) = loaded_run(&app).await;

    let (status, first) = app
        .facilitator(
            Method::POST,
            "/facilitator/votes",
            Some(json!({"template_id": "election_round_1", "eligible_candidates": &roles[..3]})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{first}");
    let first_id = first["id"].as_str().unwrap().to_string();
    for (code, candidate) in [(0, 1), (1, 0), (2, 0), (3, 1)] {
        vote_for(&app, &first_id, &codes[code], &roles[candidate]).await;
    }
    let (status, closed) = app
        .facilitator(Method::POST, &format!("/facilitator/votes/{first_id}/close"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(closed["results"]["threshold_met"], false);

    let runoff_uri = format!("/facilitator/votes/{first_id}/runoff");
    let (status, _) = app
        .facilitator(Method::POST, &runoff_uri, Some(json!({"candidates": [&roles[2]]})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app
        .facilitator(Method::POST, &runoff_uri, Some(json!({"candidates": []})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, confirmed) = app
        .facilitator(
            Method::POST,
            &runoff_uri,
            Some(json!({"candidates": [&roles[0], &roles[1]]})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{confirmed}");

    let (status, second) = app
        .facilitator(
            Method::POST,
            "/facilitator/votes",
            Some(json!({"template_id": "election_round_2"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{second}");
    let candidates: Vec<&str> = second["eligible_candidates"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["role_id"].as_str().unwrap())
        .collect();
    assert_eq!(candidates, [roles[0].as_str(), roles[1].as_str()]);

    let second_id = second["id"].as_str().unwrap().to_string();
    for (code, candidate) in [(0, 1), (1, 0), (2, 1), (3, 1)] {
        vote_for(&app, &second_id, &codes[code], &roles[candidate]).await;
    }
    for step in ["close", "announce"] {
        let (status, _) = app
            .facilitator(Method::POST, &format!("/facilitator/votes/{second_id}/{step}"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let decisions = json!({
        "taxes": {"agriculture": "lower", "trade": "same", "banking": "higher", "craft": "same"},
        "budget_priorities": {"priority_1": "defense", "priority_2": "culture", "priority_3": "trade"},
        "appointments": {"senior_judge": &roles[2]},
        "international_affairs": {"alliance": "salamis", "war_declarations": ["persia"]}
    });
    let (status, _) = app
        .participant(&codes[0], Method::POST, "/participant/king-decision", Some(decisions.clone()))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, submitted) = app
        .participant(&codes[1], Method::POST, "/participant/king-decision", Some(decisions))
        .await;
    assert_eq!(status, StatusCode::OK, "{submitted}");
    assert_eq!(submitted["appointments"]["senior_judge"]["role_id"], roles[2].as_str());

    let (status, _) = app.send(Method::GET, "/public/king-decision", None, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (_, review) = app
        .facilitator(Method::GET, "/facilitator/king-decision", None)
        .await;
    assert_eq!(review["king"]["role_id"], roles[1].as_str());
    assert!(review["decision"]["revealed_at"].is_null());

    let (status, _) = app
        .facilitator(Method::POST, "/facilitator/king-decision/reveal", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, public) = app.send(Method::GET, "/public/king-decision", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(public["taxes"]["banking"], "higher");
    assert_eq!(public["international_affairs"]["war_declarations"], json!(["persia"]));
}

#[tokio::test]
async fn completing_the_run_closes_open_votes() {
    let app = TestApp::new().await;
    let (roles, codes) = loaded_run(&app).await;

    let (_, vote) = app
        .facilitator(
            Method::POST,
            "/facilitator/votes",
            Some(json!({"template_id": "custom_election", "eligible_candidates": &roles[..2]})),
        )
        .await;
    let vote_id = vote["id"].as_str().unwrap().to_string();
    vote_for(&app, &vote_id, &codes[2], &roles[0]).await;

    let (status, _) = app
        .facilitator(Method::POST, "/facilitator/simulation/complete", None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .participant(
            &codes[3],
            Method::POST,
            &format!("/participant/votes/{vote_id}"),
            Some(json!({"choice": {"kind": "person", "role_id": &roles[0]}})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = app
        .facilitator(Method::POST, &format!("/facilitator/votes/{vote_id}/close"), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, announced) = app
        .facilitator(Method::POST, &format!("/facilitator/votes/{vote_id}/announce"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(announced["effective_winner"]["role_id"], roles[0].as_str());
}
