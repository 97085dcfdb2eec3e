use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_cli_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!("cardpool"));
    cmd.arg("tests/fixtures/orders.csv")
        .arg("--cards")
        .arg("tests/fixtures/cards.csv")
        .arg("--wait-links");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "order,payment_method,amount,card,status,link",
        ))
        // Transfer order waits on the only enabled number card
        .stdout(predicate::str::contains(
            ",bank_transfer,250,8600123412341234,pending,",
        ))
        // No bank configured: link creation fails
        .stdout(predicate::str::contains(",kapital_bank,30,998901234567,failed,"))
        .stdout(predicate::str::contains("paypal").not())
        .stderr(predicate::str::contains("Error reading card"))
        .stderr(predicate::str::contains(
            "Error creating order: unknown payment method",
        ))
        .stderr(predicate::str::contains("Error reading order"));

    Ok(())
}

#[test]
fn test_cli_without_cards_rejects_orders() -> Result<(), Box<dyn std::error::Error>> {
    let mut orders = tempfile::NamedTempFile::new()?;
    std::io::Write::write_all(&mut orders, b"payment_method, amount, payload\nbank_transfer, 10, \n")?;

    let mut cmd = Command::new(cargo_bin!("cardpool"));
    cmd.arg(orders.path()).env_remove("CARDPOOL_CARDS");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("bank_transfer").not())
        .stderr(predicate::str::contains(
            "Error creating order: There are no available cards. Try again later.",
        ));

    Ok(())
}
