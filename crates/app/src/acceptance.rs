//! End-to-end customer scenarios driven through the router with JSON fixtures.
//!
//! Each step reads like the scenario it implements; `sync_read_model` replaces
//! waiting for the background projection.

use std::{collections::HashMap, fs, path::Path};

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use customer_crud_core::{
    AggregateRoot, Customer, CustomerCreatedDomainEvent, CustomerDomainEvent,
};
use customer_crud_storage::{Database, WriteRepository};

use crate::dto::{CreateCustomerDto, CustomerDto, UpdateCustomerDto};
use crate::router::{app_router, AppState};
use crate::test_support::setup_state_with_db;

const BASE_ADDRESS: &str = "/api/v1/";

/// JSON fixtures keyed by file name.
struct JsonFilesRepository {
    files: HashMap<String, String>,
}

impl JsonFilesRepository {
    fn load() -> Self {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures");
        let files = fs::read_dir(&dir)
            .expect("fixtures directory")
            .map(|entry| entry.expect("fixture entry").path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .map(|path| {
                let name = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .expect("fixture name")
                    .to_string();
                let body = fs::read_to_string(&path).expect("fixture contents");
                (name, body)
            })
            .collect();
        Self { files }
    }

    fn get(&self, name: &str) -> &str {
        self.files
            .get(name)
            .unwrap_or_else(|| panic!("missing fixture {name}"))
    }

    fn customers(&self, name: &str) -> Vec<CreateCustomerDto> {
        serde_json::from_str(self.get(name)).expect("fixture is a customer array")
    }

    /// The creation snapshots the aggregate records for each fixture record,
    /// i.e. the fixture after domain normalisation.
    fn created_snapshots(&self, name: &str) -> Vec<CustomerCreatedDomainEvent> {
        self.customers(name)
            .iter()
            .map(|dto| {
                let customer = create_from(dto);
                match customer.pending_events() {
                    [CustomerDomainEvent::Created(created)] => created.clone(),
                    other => panic!("expected a single creation event, got {other:?}"),
                }
            })
            .collect()
    }
}

fn create_from(dto: &CreateCustomerDto) -> Customer {
    Customer::create(
        &dto.firstname,
        &dto.lastname,
        &dto.date_of_birth,
        &dto.phone_number,
        &dto.email,
        &dto.bank_account_number,
        chrono::Utc::now(),
    )
    .expect("fixture customer is valid")
}

struct LastResponse {
    status: StatusCode,
    body: String,
}

struct CustomerWorld {
    app: Router,
    state: AppState,
    database: Database,
    fixtures: JsonFilesRepository,
    response: Option<LastResponse>,
}

impl CustomerWorld {
    async fn given_i_am_a_client() -> Self {
        let (state, database) = setup_state_with_db().await;
        Self {
            app: app_router(state.clone()),
            state,
            database,
            fixtures: JsonFilesRepository::load(),
            response: None,
        }
    }

    async fn given_the_repository_has_customer_data(&mut self) {
        let mut repo = self.database.customer_writes();
        for dto in self.fixtures.customers("customer.json") {
            repo.add(create_from(&dto));
        }
        repo.commit().await.expect("seed commit");
        self.sync_read_model().await;
    }

    async fn sync_read_model(&self) {
        self.state
            .projection()
            .run_once()
            .await
            .expect("projection run");
    }

    async fn send(&mut self, method: &str, endpoint: &str, body: Option<String>) {
        let uri = format!("{BASE_ADDRESS}{endpoint}");
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json)),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("handler should respond");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body should read")
            .to_bytes();
        self.response = Some(LastResponse {
            status,
            body: String::from_utf8(bytes.to_vec()).expect("utf-8 body"),
        });
    }

    fn last(&self) -> &LastResponse {
        self.response.as_ref().expect("a request was made")
    }

    fn listed_customers(&self) -> Vec<CustomerDto> {
        serde_json::from_str(&self.last().body).expect("customer array")
    }

    async fn when_i_make_a_get_request_to(&mut self, endpoint: &str) {
        self.send("GET", endpoint, None).await;
    }

    async fn when_i_make_a_get_request_with_email(&mut self, email: &str, endpoint: &str) {
        let query = serde_urlencoded::to_string([("email", email)]).expect("query");
        self.send("GET", &format!("{endpoint}?{query}"), None).await;
    }

    async fn when_i_make_a_post_request_with(&mut self, file: &str, endpoint: &str) {
        let records: Vec<Value> =
            serde_json::from_str(self.fixtures.get(file)).expect("fixture array");
        assert_eq!(records.len(), 1, "POST fixtures hold a single record");
        self.send("POST", endpoint, Some(records[0].to_string())).await;
    }

    async fn first_listed_id(&mut self, endpoint: &str) -> String {
        self.when_i_make_a_get_request_to(endpoint).await;
        let listed = self.listed_customers();
        listed
            .first()
            .map(|customer| customer.id.to_string())
            .expect("at least one customer listed")
    }

    async fn when_i_make_a_put_request_for_changing_phone_number(
        &mut self,
        phone_number: &str,
        endpoint: &str,
    ) {
        let id = self.first_listed_id(endpoint).await;
        let body = UpdateCustomerDto {
            id: Some(id.parse().expect("listed id")),
            phone_number: Some(phone_number.to_string()),
            email: None,
        };
        let json = serde_json::to_string(&body).expect("update body");
        self.send("PUT", &format!("{endpoint}/{id}"), Some(json)).await;
    }

    async fn when_i_make_a_delete_request_for_created_customer(&mut self, endpoint: &str) {
        let id = self.first_listed_id(endpoint).await;
        self.send("DELETE", &format!("{endpoint}/{id}"), None).await;
    }

    fn then_the_response_status_code_should_be(&self, status: u16) {
        assert_eq!(self.last().status.as_u16(), status, "body: {}", self.last().body);
    }

    fn then_the_response_json_should_be(&self, file: &str) {
        let expected = self.fixtures.created_snapshots(file);
        let actual = self.listed_customers();
        assert_eq!(actual.len(), expected.len());
        for (actual, expected) in actual.iter().zip(&expected) {
            assert_eq!(actual.firstname, expected.firstname);
            assert_eq!(actual.lastname, expected.lastname);
            assert_eq!(actual.date_of_birth, expected.date_of_birth);
            assert_eq!(actual.email, expected.email);
            assert_eq!(actual.phone_number, expected.phone_number);
            assert_eq!(actual.bank_account_number, expected.bank_account_number);
        }
    }

    async fn then_the_customer_should_be_created_successfully_from(&mut self, endpoint: &str) {
        self.sync_read_model().await;
        self.when_i_make_a_get_request_to(endpoint).await;
        assert_eq!(self.listed_customers().len(), 1);
    }

    async fn then_the_phone_number_should_be_updated(&mut self, phone_number: &str, endpoint: &str) {
        self.sync_read_model().await;
        self.when_i_make_a_get_request_to(endpoint).await;
        let listed = self.listed_customers();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].phone_number, phone_number);
    }
}

#[tokio::test]
async fn listing_an_empty_repository() {
    let mut world = CustomerWorld::given_i_am_a_client().await;
    world.when_i_make_a_get_request_to("customers").await;
    world.then_the_response_status_code_should_be(200);
    world.then_the_response_json_should_be("empty.json");
}

#[tokio::test]
async fn listing_seeded_customers() {
    let mut world = CustomerWorld::given_i_am_a_client().await;
    world.given_the_repository_has_customer_data().await;
    world.when_i_make_a_get_request_to("customers").await;
    world.then_the_response_status_code_should_be(200);
    world.then_the_response_json_should_be("customer.json");
}

#[tokio::test]
async fn filtering_customers_by_email() {
    let mut world = CustomerWorld::given_i_am_a_client().await;
    world.given_the_repository_has_customer_data().await;

    world
        .when_i_make_a_get_request_with_email("john.doe@example.com", "customers")
        .await;
    world.then_the_response_status_code_should_be(200);
    world.then_the_response_json_should_be("customer.json");

    world
        .when_i_make_a_get_request_with_email("someone.else@example.com", "customers")
        .await;
    world.then_the_response_status_code_should_be(200);
    world.then_the_response_json_should_be("empty.json");
}

#[tokio::test]
async fn creating_a_customer() {
    let mut world = CustomerWorld::given_i_am_a_client().await;
    world
        .when_i_make_a_post_request_with("customer.json", "customers")
        .await;
    world.then_the_response_status_code_should_be(201);
    world
        .then_the_customer_should_be_created_successfully_from("customers")
        .await;
    world.then_the_response_json_should_be("customer.json");
}

#[tokio::test]
async fn creating_the_same_customer_twice_conflicts() {
    let mut world = CustomerWorld::given_i_am_a_client().await;
    world.given_the_repository_has_customer_data().await;
    world
        .when_i_make_a_post_request_with("customer.json", "customers")
        .await;
    world.then_the_response_status_code_should_be(409);
    world
        .then_the_customer_should_be_created_successfully_from("customers")
        .await;
}

#[tokio::test]
async fn updating_a_phone_number() {
    let mut world = CustomerWorld::given_i_am_a_client().await;
    world.given_the_repository_has_customer_data().await;
    world
        .when_i_make_a_put_request_for_changing_phone_number("+989129876543", "customers")
        .await;
    world.then_the_response_status_code_should_be(200);
    world
        .then_the_phone_number_should_be_updated("+989129876543", "customers")
        .await;
}

#[tokio::test]
async fn deleting_a_customer() {
    let mut world = CustomerWorld::given_i_am_a_client().await;
    world.given_the_repository_has_customer_data().await;
    world
        .when_i_make_a_delete_request_for_created_customer("customers")
        .await;
    world.then_the_response_status_code_should_be(204);

    world.sync_read_model().await;
    world.when_i_make_a_get_request_to("customers").await;
    world.then_the_response_status_code_should_be(200);
    world.then_the_response_json_should_be("empty.json");
}
