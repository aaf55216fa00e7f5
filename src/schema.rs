table! {
    group_members (id) {
        id -> Integer,
        group_id -> Integer,
        user_id -> Integer,
        role -> Text,
        status -> Text,
        current_balance -> BigInt,
        joined_at -> Timestamp,
    }
}

table! {
    groups (id) {
        id -> Integer,
        name -> Text,
        description -> Text,
        group_code -> Text,
        created_by -> Integer,
        savings_frequency -> Text,
        savings_amount -> BigInt,
        interest_rate -> SmallInt,
        default_loan_duration -> SmallInt,
        total_savings -> BigInt,
        leader_upi_id -> Nullable<Text>,
        leader_upi_name -> Nullable<Text>,
        created_at -> Timestamp,
    }
}

table! {
    join_requests (id) {
        id -> Integer,
        group_id -> Integer,
        user_id -> Integer,
        status -> Text,
        reviewed_by -> Nullable<Integer>,
        reviewed_at -> Nullable<Timestamp>,
        created_at -> Timestamp,
    }
}

table! {
    loans (id) {
        id -> Integer,
        group_id -> Integer,
        user_id -> Integer,
        amount -> BigInt,
        purpose -> Text,
        status -> Text,
        interest_rate -> SmallInt,
        due_date -> Nullable<Timestamp>,
        approved_by -> Nullable<Integer>,
        approved_at -> Nullable<Timestamp>,
        repaid_amount -> BigInt,
        repayment_status -> Text,
        penalty_rate -> SmallInt,
        penalty_amount -> BigInt,
        last_repayment_date -> Nullable<Timestamp>,
        requested_at -> Timestamp,
    }
}

table! {
    transactions (id) {
        id -> Integer,
        group_id -> Integer,
        user_id -> Integer,
        amount -> BigInt,
        #[sql_name = "type"]
        transaction_type -> Text,
        payment_method -> Text,
        transaction_reference -> Text,
        status -> Text,
        description -> Text,
        upi_transaction_id -> Nullable<Text>,
        upi_payment_link -> Nullable<Text>,
        qr_code_url -> Nullable<Text>,
        upi_status -> Nullable<Text>,
        created_at -> Timestamp,
    }
}

joinable!(group_members -> groups (group_id));
joinable!(join_requests -> groups (group_id));
joinable!(loans -> groups (group_id));
joinable!(transactions -> groups (group_id));

allow_tables_to_appear_in_same_query!(
    group_members,
    groups,
    join_requests,
    loans,
    transactions,
);
