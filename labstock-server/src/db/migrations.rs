//! Schema migrations.
//!
//! Idempotent `CREATE TABLE IF NOT EXISTS` statements run at startup, plus
//! seeding of the fixed role set. Joined inheritance from the data model is
//! expressed as a root `entities` table and one detail table per kind keyed
//! by `entity_id`.

use sqlx::PgPool;

/// Seeded role names. Roles carry no meaning at the database level; the
/// application attaches it.
pub const ROLES: [&str; 4] = ["admin", "editor", "viewer", "user-editor"];

/// Run all migrations.
pub async fn run(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Running labstock migrations...");

    for statement in TABLES {
        sqlx::query(statement).execute(pool).await?;
    }

    for role in ROLES {
        sqlx::query("INSERT INTO roles (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
            .bind(role)
            .execute(pool)
            .await?;
    }

    Ok(())
}

const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        timezone TEXT NOT NULL DEFAULT 'UTC',
        status TEXT NOT NULL DEFAULT 'active',
        is_admin BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        last_login_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS roles (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_roles (
        user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        role_id BIGINT NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
        PRIMARY KEY (user_id, role_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sessions (
        token TEXT PRIMARY KEY,
        user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        expires_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS password_resets (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
        reset_key TEXT NOT NULL,
        expires_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS entities (
        id BIGSERIAL PRIMARY KEY,
        label TEXT NOT NULL UNIQUE,
        entity_type TEXT NOT NULL,
        owner_id BIGINT NOT NULL REFERENCES users(id),
        origin TEXT,
        under_review BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS entities_label_idx ON entities (label)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS antibodies (
        entity_id BIGINT PRIMARY KEY REFERENCES entities(id) ON DELETE CASCADE,
        host TEXT NOT NULL,
        antigen TEXT NOT NULL,
        clone TEXT,
        specification TEXT,
        storage_temp INT,
        source TEXT,
        conjugate TEXT,
        storage_info TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS dilutions (
        id BIGSERIAL PRIMARY KEY,
        antibody_id BIGINT NOT NULL REFERENCES antibodies(entity_id) ON DELETE CASCADE,
        user_id BIGINT NOT NULL REFERENCES users(id),
        application TEXT NOT NULL,
        dilution TEXT NOT NULL,
        reference TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS plasmids (
        entity_id BIGINT PRIMARY KEY REFERENCES entities(id) ON DELETE CASCADE,
        insert_name TEXT NOT NULL,
        vector TEXT,
        cloning_date DATE,
        description TEXT,
        reference TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS preparations (
        id BIGSERIAL PRIMARY KEY,
        plasmid_id BIGINT NOT NULL REFERENCES plasmids(entity_id) ON DELETE CASCADE,
        owner_id BIGINT NOT NULL REFERENCES users(id),
        preparation_date DATE,
        method TEXT,
        eluent TEXT,
        concentration INT,
        storage_place TEXT,
        emptied_date DATE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS glycerol_stocks (
        id BIGSERIAL PRIMARY KEY,
        plasmid_id BIGINT NOT NULL REFERENCES plasmids(entity_id) ON DELETE CASCADE,
        owner_id BIGINT NOT NULL REFERENCES users(id),
        strain TEXT NOT NULL,
        transformation_date DATE NOT NULL,
        storage_place TEXT NOT NULL,
        disposal_date DATE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS oligonucleotides (
        entity_id BIGINT PRIMARY KEY REFERENCES entities(id) ON DELETE CASCADE,
        sequence TEXT NOT NULL,
        date_ordered DATE,
        storage_place TEXT,
        description TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chemicals (
        entity_id BIGINT PRIMARY KEY REFERENCES entities(id) ON DELETE CASCADE,
        cas_number TEXT,
        pubchem_cid BIGINT,
        molecular_weight DOUBLE PRECISION,
        responsible_id BIGINT REFERENCES users(id),
        storage_info TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS stock_solutions (
        id BIGSERIAL PRIMARY KEY,
        chemical_id BIGINT NOT NULL REFERENCES chemicals(entity_id) ON DELETE CASCADE,
        responsible_id BIGINT NOT NULL REFERENCES users(id),
        solvent TEXT NOT NULL,
        concentration TEXT NOT NULL,
        storage_place TEXT NOT NULL,
        details TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS fly_stocks (
        entity_id BIGINT PRIMARY KEY REFERENCES entities(id) ON DELETE CASCADE,
        chromosome_x TEXT NOT NULL DEFAULT '+',
        chromosome_y TEXT NOT NULL DEFAULT '+',
        chromosome_2 TEXT NOT NULL DEFAULT '+',
        chromosome_3 TEXT NOT NULL DEFAULT '+',
        chromosome_4 TEXT NOT NULL DEFAULT '+',
        source TEXT,
        reference TEXT,
        rating INT,
        discarded_date DATE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS modifications (
        id BIGSERIAL PRIMARY KEY,
        fly_stock_id BIGINT NOT NULL REFERENCES fly_stocks(entity_id) ON DELETE CASCADE,
        user_id BIGINT NOT NULL REFERENCES users(id),
        modified_on DATE NOT NULL,
        description TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS batches (
        id BIGSERIAL PRIMARY KEY,
        consumable_id BIGINT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
        supplier TEXT NOT NULL,
        article_number TEXT NOT NULL,
        lot TEXT NOT NULL,
        amount TEXT,
        order_date DATE,
        opened_date DATE,
        expiration_date DATE,
        emptied_date DATE,
        price DOUBLE PRECISION,
        storage_place TEXT NOT NULL,
        in_use BOOLEAN NOT NULL DEFAULT FALSE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS comments (
        id BIGSERIAL PRIMARY KEY,
        entity_id BIGINT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
        user_id BIGINT NOT NULL REFERENCES users(id),
        subject TEXT,
        body TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS files (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL REFERENCES users(id),
        entity_id BIGINT REFERENCES entities(id) ON DELETE CASCADE,
        exposed_name TEXT NOT NULL,
        stored_name TEXT UNIQUE,
        note TEXT,
        uploaded_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS requests (
        id BIGSERIAL PRIMARY KEY,
        entity_id BIGINT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
        requested_by TEXT NOT NULL,
        requested_on DATE NOT NULL DEFAULT CURRENT_DATE,
        sent_on DATE,
        note TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS import_jobs (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        file_id BIGINT NOT NULL REFERENCES files(id) ON DELETE CASCADE,
        entity_type TEXT NOT NULL,
        is_finished BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS column_mappings (
        job_id BIGINT NOT NULL REFERENCES import_jobs(id) ON DELETE CASCADE,
        mapped_field TEXT NOT NULL,
        input_column TEXT,
        PRIMARY KEY (job_id, mapped_field)
    )
    "#,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_are_idempotent() {
        for statement in TABLES {
            assert!(
                statement.contains("IF NOT EXISTS"),
                "migration statement must be idempotent: {statement}"
            );
        }
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn migrations_run_twice() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url, 2).await.expect("pool");

        run(&pool).await.expect("first run");
        run(&pool).await.expect("second run");
    }
}
