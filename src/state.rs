use crate::{
    db::{DbPool, OrmConn},
    events::EventBus,
    payments,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub events: EventBus,
    pub payments: Option<payments::Client>,
}
