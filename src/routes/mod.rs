mod auth;
mod health_check;

pub use auth::{
    change_password, forgot_password, logout, me, refresh, reset_password, signin, signup,
};
pub use health_check::health_check;
