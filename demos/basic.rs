use std::sync::Arc;

use checkout_flags::{Client, PaymentMethod, PaymentOptions, PaymentView, COD_FLAG};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Reads FEATURE_TOGGLE_URL, defaulting to http://localhost:8084
    let client = Client::builder().build()?;
    println!("{}", client.debug_info());

    let cod_enabled = client.is(COD_FLAG).enabled().await;
    println!("Feature '{}' is enabled: {}", COD_FLAG, cod_enabled);

    println!("All flags:");
    for flag in client.list_flags().await {
        println!("  {}: {}", flag.name, flag.enabled);
    }

    let mut options = PaymentOptions::mount(
        Arc::new(client),
        PaymentMethod::CreditCard,
        |method| println!("Selected payment method: {}", method),
    );

    match options.settled().await {
        PaymentView::Loading(text) => println!("{}", text),
        PaymentView::Options(form) => {
            println!("{}:", form.legend);
            for option in &form.options {
                let marker = if option.checked { "(*)" } else { "( )" };
                println!("  {} {}", marker, option.label);
            }
        }
    }

    options.select_label("Net Banking")?;

    Ok(())
}
