use easyca::create_rocket;

#[rocket::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    create_rocket().await?.launch().await?;
    Ok(())
}
