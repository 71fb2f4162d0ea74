//! Declarative role → action authorization table.
//!
//! Every role check in the service layer goes through [`is_allowed`]; ownership
//! checks (own order, own notification) are layered on top, never instead.

use crate::entity::sea_orm_active_enums::UserRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    PlaceOrder,
    UseCart,
    ViewAllOrders,
    UpdateOrderStatus,
    CancelAnyOrder,
    DeleteOrder,
    UploadShippingBill,
    ManageCatalog,
    ManageEmployees,
    ReadBroadcasts,
}

use Action::*;
use UserRole::*;

const POLICY: &[(Action, &[UserRole])] = &[
    (PlaceOrder, &[Customer, Admin]),
    (UseCart, &[Customer, Admin]),
    (ViewAllOrders, &[Employee, Staff, Admin]),
    (UpdateOrderStatus, &[Staff, Admin]),
    (CancelAnyOrder, &[Admin]),
    (DeleteOrder, &[Admin]),
    (UploadShippingBill, &[Staff, Admin]),
    (ManageCatalog, &[Staff, Admin]),
    (ManageEmployees, &[Admin]),
    (ReadBroadcasts, &[Employee, Staff, Admin]),
];

pub fn is_allowed(role: UserRole, action: Action) -> bool {
    POLICY
        .iter()
        .find(|(a, _)| *a == action)
        .is_some_and(|(_, roles)| roles.contains(&role))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_ACTIONS: [Action; 10] = [
        PlaceOrder,
        UseCart,
        ViewAllOrders,
        UpdateOrderStatus,
        CancelAnyOrder,
        DeleteOrder,
        UploadShippingBill,
        ManageCatalog,
        ManageEmployees,
        ReadBroadcasts,
    ];

    #[test]
    fn every_action_has_a_policy_row() {
        for action in ALL_ACTIONS {
            assert!(
                POLICY.iter().any(|(a, _)| *a == action),
                "missing policy row for {action:?}"
            );
        }
    }

    #[test]
    fn admin_may_do_everything() {
        for action in ALL_ACTIONS {
            assert!(is_allowed(Admin, action), "admin denied {action:?}");
        }
    }

    #[test]
    fn customers_only_shop() {
        assert!(is_allowed(Customer, PlaceOrder));
        assert!(is_allowed(Customer, UseCart));
        assert!(!is_allowed(Customer, ViewAllOrders));
        assert!(!is_allowed(Customer, CancelAnyOrder));
        assert!(!is_allowed(Customer, ManageCatalog));
        assert!(!is_allowed(Customer, ReadBroadcasts));
    }

    #[test]
    fn staff_runs_fulfilment_but_not_personnel() {
        assert!(is_allowed(Staff, UpdateOrderStatus));
        assert!(is_allowed(Staff, UploadShippingBill));
        assert!(is_allowed(Staff, ManageCatalog));
        assert!(!is_allowed(Staff, ManageEmployees));
        assert!(!is_allowed(Staff, DeleteOrder));
        assert!(!is_allowed(Staff, CancelAnyOrder));
    }

    #[test]
    fn employees_can_only_read() {
        assert!(is_allowed(Employee, ViewAllOrders));
        assert!(is_allowed(Employee, ReadBroadcasts));
        assert!(!is_allowed(Employee, UpdateOrderStatus));
        assert!(!is_allowed(Employee, PlaceOrder));
    }
}
