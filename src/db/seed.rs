use crate::domain::models::{status_names, Role};
use anyhow::Result;
use sqlx::PgPool;

pub async fn seed_all(pool: &PgPool) -> Result<()> {
    seed_groups(pool).await?;
    seed_statuses(pool).await?;
    seed_admin(pool).await?;
    Ok(())
}

async fn seed_groups(pool: &PgPool) -> Result<()> {
    for role in Role::ALL {
        sqlx::query("INSERT INTO groups (id, name) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING")
            .bind(role.id())
            .bind(role.group_name())
            .execute(pool)
            .await?;
    }
    Ok(())
}

async fn seed_statuses(pool: &PgPool) -> Result<()> {
    for name in status_names::SEEDED {
        sqlx::query("INSERT INTO request_statuses (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
            .bind(name)
            .execute(pool)
            .await?;
    }
    Ok(())
}

/// Bootstrap administrator from ADMIN_USERNAME / ADMIN_PASSWORD, if both are set.
async fn seed_admin(pool: &PgPool) -> Result<()> {
    let (Ok(username), Ok(password)) = (
        std::env::var("ADMIN_USERNAME"),
        std::env::var("ADMIN_PASSWORD"),
    ) else {
        return Ok(());
    };

    if super::username_taken(pool, &username).await? {
        return Ok(());
    }

    let hash = crate::password::hash_password(&password)?;

    let id = super::create_user(
        pool,
        &super::NewUser {
            username: &username,
            first_name: "Administrador",
            last_name: "",
            email: "",
            phone: None,
            role: Role::Secpla,
            password_hash: &hash,
        },
    )
    .await?;
    tracing::info!("Seeded administrator {} (id {})", username, id);
    Ok(())
}
