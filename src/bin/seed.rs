use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use pedido_express_api::{config::AppConfig, db::create_pool};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    sqlx::migrate!("./migrations").run(&pool).await?;

    let admin_id =
        ensure_user(&pool, "admin@pedido.express", "admin123", "Casa Admin", "admin").await?;
    let attendant_id = ensure_user(
        &pool,
        "attendant@pedido.express",
        "attendant123",
        "Counter Attendant",
        "attendant",
    )
    .await?;
    let customer_id = ensure_user(
        &pool,
        "customer@example.com",
        "customer123",
        "Maria Souza",
        "customer",
    )
    .await?;
    seed_menu(&pool).await?;

    println!(
        "Seed completed. Admin: {admin_id}, Attendant: {attendant_id}, Customer: {customer_id}"
    );
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    email: &str,
    password: &str,
    full_name: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, full_name, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(full_name)
    .bind(role)
    .fetch_optional(pool)
    .await?;

    // If user already exists, fetch id
    let user_id = match row {
        Some((id,)) => id,
        None => {
            let existing: (Uuid,) = sqlx::query_as("SELECT id FROM users WHERE email = $1")
                .bind(email)
                .fetch_one(pool)
                .await?;
            existing.0
        }
    };

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn seed_menu(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    // Prices in centavos.
    let products = vec![
        ("X-Burger", "Beef burger with cheese and salad", 2500, 40),
        ("X-Bacon", "Beef burger with bacon and cheddar", 2900, 40),
        ("Batata Frita", "Crispy fries, serves two", 1500, 60),
        ("Pastel de Queijo", "Fried pastry with melted cheese", 1200, 50),
        ("Guarana 350ml", "Soft drink can", 600, 120),
        ("Suco de Laranja", "Fresh orange juice, 500ml", 900, 30),
        ("Pudim", "Caramel flan slice", 1100, 20),
    ];

    for (name, desc, price, stock) in products {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, price, stock_quantity)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(desc)
        .bind(price)
        .bind(stock)
        .execute(pool)
        .await?;
    }

    println!("Seeded menu products");
    Ok(())
}
