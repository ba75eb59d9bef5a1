//! `create-user` subcommand.
//!
//! Creates an account directly in the database, bypassing e-mail
//! activation. With `--superuser` the account gets administrator rights.

use crate::auth::password::hash_password;
use crate::db::Database;
use crate::error::ApiError;
use crate::types::{NewUser, User};
use crate::validation::is_valid_email;
use anyhow::{Result, bail};
use clap::Args;

/// Arguments for the create-user subcommand
#[derive(Args, Debug)]
pub struct CreateUserArgs {
    /// E-mail address (login name)
    #[arg(long)]
    pub email: String,

    /// Initial password
    #[arg(long)]
    pub password: String,

    #[arg(long, default_value = "")]
    pub first_name: String,

    #[arg(long, default_value = "")]
    pub last_name: String,

    /// Grant staff, superuser and moderator rights
    #[arg(long)]
    pub superuser: bool,
}

/// Run the subcommand against an open database.
pub fn run_create_user(db: &Database, args: &CreateUserArgs, min_password_length: usize) -> Result<User> {
    let email = args.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        bail!("'{}' is not a valid e-mail address", args.email);
    }
    if args.password.chars().count() < min_password_length {
        bail!(
            "Password must contain at least {} characters",
            min_password_length
        );
    }

    let mut new_user = if args.superuser {
        NewUser::superuser(email, args.password.clone())
    } else {
        NewUser {
            email,
            password: args.password.clone(),
            is_verified: true,
            ..Default::default()
        }
    };
    new_user.first_name = args.first_name.trim().to_string();
    new_user.last_name = args.last_name.trim().to_string();

    let hash = hash_password(&new_user.password)?;
    let user = db.create_user(&new_user, &hash).map_err(|err| match err.downcast::<ApiError>() {
        Ok(api) => anyhow::anyhow!("{}", api),
        Err(err) => err,
    })?;
    tracing::info!(user_id = user.id, email = %user.email, superuser = user.is_superuser, "Created user");
    Ok(user)
}
