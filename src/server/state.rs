use crate::session::SessionHandle;
use crate::store::LocationStore;
use std::sync::Mutex;

pub struct AppState {
    pub session: SessionHandle,
    pub store: Mutex<LocationStore>,
}
