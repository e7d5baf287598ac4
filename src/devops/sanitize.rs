use crate::model::work_item::WorkItem;

/// Fields stripped from every work item before it is serialized for a tool
/// result. Board-extension bookkeeping and org-specific custom fields that
/// only add noise for consumers. One shared list for all call sites.
pub const FIELD_DENY_LIST: &[&str] = &[
    "System.BoardColumn",
    "System.BoardColumnDone",
    "Microsoft.VSTS.Common.StateChangeDate",
    "Microsoft.VSTS.Common.BacklogPriority",
    "Custom.Prioritylabel",
    "Custom.Gemelddoor",
    "Custom.2de39240-faed-4fe3-b801-ef09f9fd7649",
    "WEF_B3FED8AD69D747B6AC8B9F6676FE00D5_Kanban.Column",
    "WEF_B3FED8AD69D747B6AC8B9F6676FE00D5_Kanban.Column.Done",
    "WEF_E3D5FEEF0D5C4CD29F6F67FAC6285285_Kanban.Column",
    "WEF_E3D5FEEF0D5C4CD29F6F67FAC6285285_Kanban.Column.Done",
    "WEF_0385387BCAE24F04812DCCA8DDDCACCF_Kanban.Column",
    "WEF_0385387BCAE24F04812DCCA8DDDCACCF_Kanban.Column.Done",
    "WEF_79A5E30B13314406B1F0E7D6F6C55286_Kanban.Column",
    "WEF_79A5E30B13314406B1F0E7D6F6C55286_Kanban.Column.Done",
    "WEF_200960F548D74851B0D1C2812ACEE989_Kanban.Column",
    "WEF_200960F548D74851B0D1C2812ACEE989_Kanban.Column.Done",
];

/// Remove deny-listed fields and the link/url/format members from a work
/// item, in place. Removing an absent key is a no-op, so applying this twice
/// is the same as applying it once.
pub fn sanitize_work_item(item: &mut WorkItem) {
    for key in FIELD_DENY_LIST {
        item.fields.remove(*key);
    }
    item.multiline_fields_format = None;
    item.links = None;
    item.url = None;
}
