use std::time::Duration;

use remeha_home::{AccountContext, Config, CoordinatorState, Event};

#[tokio::main]
async fn main() -> remeha_home::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    println!("Logging in to Remeha Home...");

    let account = AccountContext::connect_with(config, |builder| {
        builder
            .on_event(|event| match event {
                Event::StateChanged { .. } => {}
                other => println!("{other:?}"),
            })
            .on_snapshot(|snapshot| {
                for appliance in snapshot.appliances() {
                    for zone in &appliance.climate_zones {
                        println!(
                            "[{}] {} | target: {} | mode: {} | program: {}",
                            zone.name,
                            celsius(zone.room_temperature),
                            celsius(zone.target_temperature()),
                            zone.mode.as_remeha_str(),
                            zone.active_program.map_or("-".to_string(), |p| p.to_string()),
                        );
                    }
                    for dhw in &appliance.hot_water_zones {
                        println!("[{}] {} | {:?}", dhw.name, celsius(dhw.temperature), dhw.status);
                    }
                    println!(
                        "Outdoor: {} | pressure: {} bar | heating today: {:.2} kWh",
                        celsius(appliance.outdoor_temperature),
                        appliance.water_pressure.map_or("-".to_string(), |p| format!("{p:.1}")),
                        appliance.consumption.heating_energy_consumed(),
                    );
                }
            })
    })
    .await?;
    println!(
        "Connected, {} entities. Polling for updates...",
        account.coordinator().snapshot().len()
    );

    let mut state = account.coordinator().subscribe_state();
    loop {
        if state.changed().await.is_err() {
            break;
        }
        let current = *state.borrow_and_update();
        match current {
            CoordinatorState::AuthFailed => {
                eprintln!("Authentication failed, logging in again...");
                while let Err(e) = account.reauthenticate().await {
                    eprintln!("Login failed: {e}, retrying in a minute");
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
            }
            CoordinatorState::Degraded => eprintln!("Refresh failed, showing last known values"),
            CoordinatorState::Idle | CoordinatorState::Refreshing => {}
        }
    }

    account.shutdown().await;
    Ok(())
}

fn celsius(value: Option<f64>) -> String {
    value.map_or("-".to_string(), |t| format!("{t:.1}\u{00b0}C"))
}
