mod common;

use anyhow::Result;
use common::{funded, open, test_service};
use ledgerbank::application::AppError;
use ledgerbank::domain::{OperationType, compute_balance, is_balanced, is_single_sided};
use ledgerbank::storage::Page;
use rust_decimal_macros::dec;
use uuid::Uuid;

#[tokio::test]
async fn test_deposit_credits_account_and_debits_settlement() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = open(&service, "Alice").await?;

    let group_id = service.deposit(account.id, "100.0000").await?;

    let account = service.get_account(account.id).await?;
    assert_eq!(account.balance, dec!(100));
    let settlement = service.settlement_account().await?;
    assert_eq!(settlement.balance, dec!(-100));

    let entries = service.get_transaction(group_id).await?;
    assert_eq!(entries.len(), 2);
    assert!(is_balanced(&entries));
    assert!(entries.iter().all(|e| e.operation_type == OperationType::Deposit));
    assert!(entries.iter().all(|e| is_single_sided(e.debit, e.credit)));

    let credit = entries.iter().find(|e| e.account_id == account.id).unwrap();
    assert_eq!(credit.credit, dec!(100));
    assert_eq!(credit.debit, dec!(0));
    assert_eq!(credit.description.as_deref(), Some("External deposit"));

    let debit = entries.iter().find(|e| e.account_id == settlement.id).unwrap();
    assert_eq!(debit.debit, dec!(100));
    assert_eq!(
        debit.description,
        Some(format!("Deposit to account {}", account.id))
    );

    assert!(service.reconcile_account(account.id).await?.matched);
    assert!(service.reconcile_account(settlement.id).await?.matched);

    Ok(())
}

#[tokio::test]
async fn test_withdraw_moves_money_back_to_settlement() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = funded(&service, "Alice", "100").await?;

    let group_id = service.withdraw(account.id, "40.5").await?;

    assert_eq!(service.get_account(account.id).await?.balance, dec!(59.5));
    assert_eq!(service.settlement_account().await?.balance, dec!(-59.5));

    let entries = service.get_transaction(group_id).await?;
    assert_eq!(entries.len(), 2);
    assert!(is_balanced(&entries));
    assert!(entries.iter().all(|e| e.operation_type == OperationType::Withdrawal));

    Ok(())
}

#[tokio::test]
async fn test_withdraw_insufficient_funds_leaves_no_trace() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = funded(&service, "Alice", "30").await?;

    let err = service.withdraw(account.id, "50").await.unwrap_err();
    match err {
        AppError::InsufficientFunds {
            account_id,
            available,
            requested,
        } => {
            assert_eq!(account_id, account.id);
            assert_eq!(available, dec!(30));
            assert_eq!(requested, dec!(50));
        }
        other => panic!("expected InsufficientFunds, got {other:?}"),
    }

    assert_eq!(service.get_account(account.id).await?.balance, dec!(30));
    // Only the funding deposit is on record
    let entries = service.list_entries(account.id, Page::default()).await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(service.ledger_total().await?, dec!(0));

    Ok(())
}

#[tokio::test]
async fn test_withdraw_entire_balance() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = funded(&service, "Alice", "25.0001").await?;

    service.withdraw(account.id, "25.0001").await?;

    assert_eq!(service.get_account(account.id).await?.balance, dec!(0));
    assert!(service.reconcile_account(account.id).await?.matched);
    Ok(())
}

#[tokio::test]
async fn test_transfer_between_accounts() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let alice = funded(&service, "Alice", "100").await?;
    let bob = funded(&service, "Bob", "10").await?;

    let group_id = service.transfer(alice.id, bob.id, "20.0000").await?;

    assert_eq!(service.get_account(alice.id).await?.balance, dec!(80));
    assert_eq!(service.get_account(bob.id).await?.balance, dec!(30));
    // Settlement is not involved in transfers
    assert_eq!(service.settlement_account().await?.balance, dec!(-110));

    let entries = service.get_transaction(group_id).await?;
    assert_eq!(entries.len(), 2);
    assert!(is_balanced(&entries));

    let debit = entries.iter().find(|e| e.account_id == alice.id).unwrap();
    assert_eq!(debit.debit, dec!(20));
    assert_eq!(debit.description, Some(format!("Transfer to {}", bob.id)));
    let credit = entries.iter().find(|e| e.account_id == bob.id).unwrap();
    assert_eq!(credit.credit, dec!(20));
    assert_eq!(credit.description, Some(format!("Transfer from {}", alice.id)));

    assert_eq!(service.ledger_total().await?, dec!(0));
    Ok(())
}

#[tokio::test]
async fn test_transfer_currency_mismatch() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let naira = funded(&service, "Naira", "100").await?;
    let dollars = service.open_account("Dollars", "USD", None).await?;

    let err = service
        .transfer(naira.id, dollars.id, "10")
        .await
        .unwrap_err();
    match err {
        AppError::CurrencyMismatch { expected, found } => {
            assert_eq!(expected, "NGN");
            assert_eq!(found, "USD");
        }
        other => panic!("expected CurrencyMismatch, got {other:?}"),
    }

    assert_eq!(service.get_account(naira.id).await?.balance, dec!(100));
    assert_eq!(service.get_account(dollars.id).await?.balance, dec!(0));
    Ok(())
}

#[tokio::test]
async fn test_deposit_into_foreign_currency_account_is_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let dollars = service.open_account("Dollars", "USD", None).await?;

    let err = service.deposit(dollars.id, "10").await.unwrap_err();
    assert!(matches!(err, AppError::CurrencyMismatch { .. }));
    assert!(
        service
            .list_entries(dollars.id, Page::default())
            .await?
            .is_empty()
    );
    Ok(())
}

#[tokio::test]
async fn test_same_account_transfer_is_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = funded(&service, "Alice", "100").await?;

    let err = service
        .transfer(account.id, account.id, "10")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::SameAccountTransfer(id) if id == account.id));
    assert_eq!(service.get_account(account.id).await?.balance, dec!(100));
    Ok(())
}

#[tokio::test]
async fn test_invalid_amounts_are_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = funded(&service, "Alice", "100").await?;
    let other = open(&service, "Bob").await?;

    for amount in ["", "-", "0", "-5", "abc", "1.00001", "1e3"] {
        let err = service.deposit(account.id, amount).await.unwrap_err();
        assert!(
            matches!(err, AppError::InvalidAmount(_)),
            "deposit {amount:?}: {err:?}"
        );

        let err = service.withdraw(account.id, amount).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidAmount(_)));

        let err = service
            .transfer(account.id, other.id, amount)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidAmount(_)));
    }

    assert_eq!(service.get_account(account.id).await?.balance, dec!(100));
    Ok(())
}

#[tokio::test]
async fn test_unknown_accounts() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = funded(&service, "Alice", "100").await?;
    let missing = Uuid::new_v4();

    assert!(matches!(
        service.deposit(missing, "10").await,
        Err(AppError::AccountNotFound(id)) if id == missing
    ));
    assert!(matches!(
        service.withdraw(missing, "10").await,
        Err(AppError::AccountNotFound(_))
    ));
    assert!(matches!(
        service.transfer(account.id, missing, "10").await,
        Err(AppError::AccountNotFound(id)) if id == missing
    ));
    assert!(matches!(
        service.reconcile_account(missing).await,
        Err(AppError::AccountNotFound(_))
    ));
    assert!(matches!(
        service.list_entries(missing, Page::default()).await,
        Err(AppError::AccountNotFound(_))
    ));

    // The failed transfer must not have touched the source account
    assert_eq!(service.get_account(account.id).await?.balance, dec!(100));
    Ok(())
}

#[tokio::test]
async fn test_ledger_sums_to_zero_after_mixed_operations() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let alice = funded(&service, "Alice", "500").await?;
    let bob = funded(&service, "Bob", "250.1234").await?;
    let carol = open(&service, "Carol").await?;

    service.transfer(alice.id, bob.id, "120").await?;
    service.transfer(bob.id, carol.id, "70.0034").await?;
    service.withdraw(carol.id, "0.0001").await?;
    service.deposit(carol.id, "3").await?;
    let _ = service.withdraw(alice.id, "1000").await;

    assert_eq!(service.ledger_total().await?, dec!(0));

    let settlement = service.settlement_account().await?;
    for id in [alice.id, bob.id, carol.id, settlement.id] {
        let result = service.reconcile_account(id).await?;
        assert!(result.matched, "account {id} drifted: {result:?}");
    }

    assert_eq!(service.get_account(alice.id).await?.balance, dec!(380));
    assert_eq!(service.get_account(bob.id).await?.balance, dec!(300.12));
    assert_eq!(service.get_account(carol.id).await?.balance, dec!(73.0033));

    let carol_entries = service.list_entries(carol.id, Page::default()).await?;
    assert_eq!(carol_entries.len(), 3);
    assert_eq!(compute_balance(&carol_entries), dec!(73.0033));
    Ok(())
}

#[tokio::test]
async fn test_settlement_account_cannot_be_targeted() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = funded(&service, "Alice", "100").await?;
    let settlement = service.settlement_account().await?;

    assert!(matches!(
        service.deposit(settlement.id, "10").await,
        Err(AppError::SystemAccount(id)) if id == settlement.id
    ));
    assert!(matches!(
        service.withdraw(settlement.id, "10").await,
        Err(AppError::SystemAccount(_))
    ));
    assert!(matches!(
        service.transfer(account.id, settlement.id, "10").await,
        Err(AppError::SystemAccount(_))
    ));
    assert!(matches!(
        service.transfer(settlement.id, account.id, "10").await,
        Err(AppError::SystemAccount(_))
    ));

    assert_eq!(service.get_account(account.id).await?.balance, dec!(100));
    assert_eq!(service.settlement_account().await?.balance, dec!(-100));
    assert_eq!(
        service
            .list_entries(settlement.id, Page::default())
            .await?
            .len(),
        1
    );
    Ok(())
}
